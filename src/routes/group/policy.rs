use crate::{error::AppError, utils::Claims};

/// 容量校验：当前成员数严格小于上限才允许再接纳一人
///
/// 传入的 current_member_count 必须是审批事务内新读出的计数，
/// 并发审批会让任何缓存值失效。
pub fn check_capacity(max_member_count: i64, current_member_count: i64) -> Result<(), AppError> {
    if current_member_count < max_member_count {
        Ok(())
    } else {
        Err(AppError::CapacityExceeded)
    }
}

/// 权限校验：组长本人或系统管理员才能执行小组管理操作
pub fn ensure_leader_or_admin(claims: &Claims, leader_id: i64) -> Result<(), AppError> {
    if claims.sub == leader_id || claims.is_admin {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: i64, is_admin: bool) -> Claims {
        Claims {
            sub,
            exp: 0,
            iat: 0,
            is_admin,
        }
    }

    #[test]
    fn capacity_allows_below_max() {
        assert!(check_capacity(10, 9).is_ok());
        assert!(check_capacity(1, 0).is_ok());
    }

    #[test]
    fn capacity_rejects_at_max() {
        assert!(matches!(
            check_capacity(10, 10),
            Err(AppError::CapacityExceeded)
        ));
        assert!(matches!(
            check_capacity(1, 1),
            Err(AppError::CapacityExceeded)
        ));
    }

    #[test]
    fn capacity_rejects_above_max() {
        // 上限被调低后计数可能已超过上限
        assert!(matches!(
            check_capacity(5, 8),
            Err(AppError::CapacityExceeded)
        ));
    }

    #[test]
    fn leader_is_authorized() {
        assert!(ensure_leader_or_admin(&claims(1, false), 1).is_ok());
    }

    #[test]
    fn admin_is_authorized() {
        assert!(ensure_leader_or_admin(&claims(2, true), 1).is_ok());
    }

    #[test]
    fn other_member_is_denied() {
        assert!(matches!(
            ensure_leader_or_admin(&claims(2, false), 1),
            Err(AppError::PermissionDenied)
        ));
    }
}
