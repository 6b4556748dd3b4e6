use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wegather_backend::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'wegather_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let redis_arc = Arc::new(redis_client.clone());

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: redis_arc,
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis_client, config.clone()));

    // 所有接口都需要认证，会员注册和登录由独立的认证服务负责
    let protected_routes = Router::new()
        // 小组路由
        .route("/smallGroups", post(routes::group::create_group))
        .route(
            "/smallGroups/{id}",
            get(routes::group::get_group)
                .put(routes::group::update_group)
                .delete(routes::group::delete_group),
        )
        .route("/smallGroups/{id}/publish", post(routes::group::publish_group))
        .route(
            "/smallGroups/{id}/recruiting",
            post(routes::group::open_recruiting),
        )
        .route("/smallGroups/{id}/close", post(routes::group::close_group))
        .route(
            "/smallGroups/{id}/members",
            get(routes::group::get_group_members),
        )
        .route(
            "/smallGroups/{id}/members/{member_id}",
            put(routes::group::set_member_role).delete(routes::group::remove_group_member),
        )
        .route("/smallGroups/{id}/leave", post(routes::group::leave_group))
        // 加入申请路由
        .route(
            "/smallGroups/{id}/join/requests",
            post(routes::join::create_join_request).get(routes::join::list_join_requests),
        )
        .route(
            "/smallGroups/{id}/join/requests/{request_id}/approve",
            post(routes::join::approve_join_request),
        )
        .route(
            "/smallGroups/{id}/join/requests/{request_id}/reject",
            post(routes::join::reject_join_request),
        )
        // 应用认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // 创建基础路由
    let router = Router::new().nest(&config.api_base_uri.clone(), protected_routes);

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        let cors = CorsLayer::permissive();
        router.layer(cors)
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
