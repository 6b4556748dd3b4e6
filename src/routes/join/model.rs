use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::routes::group::model::{GROUP_COLUMNS, Group, MemberRole};
use crate::routes::group::policy::check_capacity;

/// 加入申请列表分页大小
pub const JOIN_REQUEST_PAGE_SIZE: i64 = 20;

/// 加入申请状态，REQUESTED 只会流转到 APPROVED 或 REJECTED 之一
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRequestStatus {
    Requested,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Requested => "REQUESTED",
            JoinRequestStatus::Approved => "APPROVED",
            JoinRequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "REQUESTED" => Ok(JoinRequestStatus::Requested),
            "APPROVED" => Ok(JoinRequestStatus::Approved),
            "REJECTED" => Ok(JoinRequestStatus::Rejected),
            _ => Err(AppError::Validation(format!("未知的申请状态: {}", s))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct JoinRequest {
    pub id: i64,
    pub group_id: i64,
    pub member_id: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// 组长查看的申请人信息投影
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct JoinRequestInfo {
    pub request_id: i64,
    pub member_id: i64,
    pub username: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JoinRequestPage {
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub content: Vec<JoinRequestInfo>,
}

impl JoinRequest {
    /// 创建加入申请
    ///
    /// 前置校验按顺序执行，第一个不满足的决定返回的错误：
    /// 不是组长本人、还不是成员、没有待处理申请、小组当前可加入。
    /// 申请阶段不校验容量，容量只在审批时生效。
    pub async fn create(pool: &PgPool, group: &Group, member_id: i64) -> Result<Self, AppError> {
        if group.is_leader(member_id) {
            return Err(AppError::InvalidState("小组组长不能申请加入自己的小组"));
        }

        let is_member = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = $1 AND member_id = $2)",
        )
        .bind(group.id)
        .bind(member_id)
        .fetch_one(pool)
        .await?;

        if is_member {
            return Err(AppError::InvalidState("已经是小组成员"));
        }

        let has_pending = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM group_join_requests
                WHERE group_id = $1 AND member_id = $2 AND status = $3
            )
            "#,
        )
        .bind(group.id)
        .bind(member_id)
        .bind(JoinRequestStatus::Requested.as_str())
        .fetch_one(pool)
        .await?;

        if has_pending {
            return Err(AppError::InvalidState("已有待处理的加入申请"));
        }

        if !group.lifecycle().is_joinable() {
            return Err(AppError::InvalidState("小组当前不接受加入申请"));
        }

        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            INSERT INTO group_join_requests (group_id, member_id, status)
            VALUES ($1, $2, $3)
            RETURNING id, group_id, member_id, status, created_at, decided_at
            "#,
        )
        .bind(group.id)
        .bind(member_id)
        .bind(JoinRequestStatus::Requested.as_str())
        .fetch_one(pool)
        .await
        .map_err(|e| match e {
            // 并发重复申请由待处理唯一索引兜底
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::InvalidState("已有待处理的加入申请")
            }
            other => AppError::from(other),
        })?;

        Ok(request)
    }

    /// 分页查询待处理的加入申请，排序和分页交给数据库
    pub async fn list(
        pool: &PgPool,
        group_id: i64,
        page: i64,
    ) -> Result<JoinRequestPage, AppError> {
        let total_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_join_requests WHERE group_id = $1 AND status = $2",
        )
        .bind(group_id)
        .bind(JoinRequestStatus::Requested.as_str())
        .fetch_one(pool)
        .await?;

        let content = sqlx::query_as::<_, JoinRequestInfo>(
            r#"
            SELECT r.id AS request_id, r.member_id, m.username, m.email, m.profile_image,
                   r.created_at
            FROM group_join_requests r
            JOIN members m ON m.id = r.member_id
            WHERE r.group_id = $1 AND r.status = $2
            ORDER BY r.created_at
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(group_id)
        .bind(JoinRequestStatus::Requested.as_str())
        .bind(JOIN_REQUEST_PAGE_SIZE)
        .bind(page * JOIN_REQUEST_PAGE_SIZE)
        .fetch_all(pool)
        .await?;

        Ok(JoinRequestPage {
            page,
            page_size: JOIN_REQUEST_PAGE_SIZE,
            total_count,
            content,
        })
    }

    /// 审批通过：在同一个事务里锁定小组行、重读成员数、校验容量、
    /// 写入成员记录并更新申请状态，要么全部提交要么全部回滚。
    ///
    /// 容量校验失败直接回滚，申请保持 REQUESTED，等待重试或手动拒绝。
    pub async fn approve(pool: &PgPool, group_id: i64, request_id: i64) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        // 行锁把同一小组的并发审批串行化，只剩一个名额时只能成功一个
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM small_groups WHERE id = $1 FOR UPDATE"
        ))
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("小组不存在"))?;

        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            SELECT id, group_id, member_id, status, created_at, decided_at
            FROM group_join_requests
            WHERE id = $1 AND group_id = $2
            FOR UPDATE
            "#,
        )
        .bind(request_id)
        .bind(group_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("加入申请不存在"))?;

        if JoinRequestStatus::parse(&request.status)? != JoinRequestStatus::Requested {
            return Err(AppError::InvalidState("该加入申请已处理"));
        }

        let current_member_count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_members WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_one(&mut *tx)
        .await?;

        check_capacity(group.max_member_count, current_member_count)?;

        sqlx::query("INSERT INTO group_members (group_id, member_id, role) VALUES ($1, $2, $3)")
            .bind(group_id)
            .bind(request.member_id)
            .bind(MemberRole::Member.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE group_join_requests SET status = $1, decided_at = NOW() WHERE id = $2",
        )
        .bind(JoinRequestStatus::Approved.as_str())
        .bind(request_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            "join request {} approved, member {} admitted to group {}",
            request_id,
            request.member_id,
            group_id
        );

        Ok(())
    }

    /// 拒绝申请，不产生任何成员记录
    pub async fn reject(pool: &PgPool, group_id: i64, request_id: i64) -> Result<(), AppError> {
        let request = sqlx::query_as::<_, JoinRequest>(
            r#"
            SELECT id, group_id, member_id, status, created_at, decided_at
            FROM group_join_requests
            WHERE id = $1 AND group_id = $2
            "#,
        )
        .bind(request_id)
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("加入申请不存在"))?;

        if JoinRequestStatus::parse(&request.status)? != JoinRequestStatus::Requested {
            return Err(AppError::InvalidState("该加入申请已处理"));
        }

        // 状态条件兜底和审批的并发竞争
        let result = sqlx::query(
            r#"
            UPDATE group_join_requests
            SET status = $1, decided_at = NOW()
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(JoinRequestStatus::Rejected.as_str())
        .bind(request_id)
        .bind(JoinRequestStatus::Requested.as_str())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState("该加入申请已处理"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parse_round_trip() {
        for status in [
            JoinRequestStatus::Requested,
            JoinRequestStatus::Approved,
            JoinRequestStatus::Rejected,
        ] {
            assert_eq!(JoinRequestStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            JoinRequestStatus::parse("CANCELLED"),
            Err(AppError::Validation(_))
        ));
    }
}
