pub(crate) mod model;

mod handler;

pub use handler::{
    approve_join_request,
    create_join_request,
    list_join_requests,
    reject_join_request,
};
