use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::error::AppError;

use super::lifecycle::{GroupStatus, Lifecycle, RecruitingType};

// 缓存相关常量
const GROUP_CACHE_EXPIRE: u64 = 600; // 小组缓存过期时间，单位秒
const GROUP_ID_CACHE_PREFIX: &str = "group:id:"; // 小组ID缓存前缀

pub(crate) const GROUP_COLUMNS: &str = "id, name, short_description, full_description, leader_id, \
     max_member_count, published, recruiting, closed, recruiting_type, \
     published_at, recruiting_updated_at, closed_at, created_at";

/// 小组成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Member,
    Manager,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "MEMBER",
            MemberRole::Manager => "MANAGER",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "MEMBER" => Ok(MemberRole::Member),
            "MANAGER" => Ok(MemberRole::Manager),
            _ => Err(AppError::Validation(format!("未知的成员角色: {}", s))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub short_description: String,
    pub full_description: String,
    pub leader_id: i64,
    pub max_member_count: i64,
    pub published: bool,
    pub recruiting: bool,
    pub closed: bool,
    pub recruiting_type: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub recruiting_updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub max_member_count: i64,
}

impl CreateGroupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_group_fields(&self.name, self.max_member_count)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: String,
    pub short_description: Option<String>,
    pub full_description: Option<String>,
    pub max_member_count: i64,
}

impl UpdateGroupRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_group_fields(&self.name, self.max_member_count)
    }
}

fn validate_group_fields(name: &str, max_member_count: i64) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("小组名称不能为空".into()));
    }
    if max_member_count < 1 {
        return Err(AppError::Validation("小组人数上限必须大于0".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct OpenRecruitingRequest {
    pub recruiting_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SetMemberRoleRequest {
    pub role: String,
}

/// 小组详情，状态和可加入性由生命周期标志推导
#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub id: i64,
    pub name: String,
    pub short_description: String,
    pub full_description: String,
    pub leader_id: i64,
    pub max_member_count: i64,
    pub current_member_count: i64,
    pub status: &'static str,
    pub recruiting_type: Option<String>,
    pub is_joinable: bool,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub recruiting_updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct GroupMemberInfo {
    pub member_id: i64,
    pub username: String,
    pub profile_image: Option<String>,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

impl Group {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.published, self.recruiting, self.closed)
    }

    pub fn status(&self) -> GroupStatus {
        self.lifecycle().status()
    }

    pub fn is_leader(&self, member_id: i64) -> bool {
        self.leader_id == member_id
    }

    pub fn into_info(self, current_member_count: i64) -> GroupInfo {
        let status = self.status().as_str();
        let is_joinable = self.lifecycle().is_joinable();
        GroupInfo {
            id: self.id,
            name: self.name,
            short_description: self.short_description,
            full_description: self.full_description,
            leader_id: self.leader_id,
            max_member_count: self.max_member_count,
            current_member_count,
            status,
            recruiting_type: self.recruiting_type,
            is_joinable,
            created_at: self.created_at,
            published_at: self.published_at,
            recruiting_updated_at: self.recruiting_updated_at,
            closed_at: self.closed_at,
        }
    }

    /// 创建小组，创建者即组长，初始状态未公开。
    /// 组长不占成员名额，不写入成员表。
    pub async fn create(
        pool: &PgPool,
        req: &CreateGroupRequest,
        leader_id: i64,
    ) -> Result<Self, AppError> {
        let group = sqlx::query_as::<_, Group>(&format!(
            r#"
            INSERT INTO small_groups (name, short_description, full_description, leader_id, max_member_count)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {GROUP_COLUMNS}
            "#
        ))
        .bind(req.name.trim())
        .bind(req.short_description.as_deref().unwrap_or(""))
        .bind(req.full_description.as_deref().unwrap_or(""))
        .bind(leader_id)
        .bind(req.max_member_count)
        .fetch_one(pool)
        .await?;

        Ok(group)
    }

    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
    ) -> Result<Option<Self>, AppError> {
        let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);

        // 先查缓存
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;
            if let Ok(json_str) = cached {
                if let Ok(group) = serde_json::from_str::<Group>(&json_str) {
                    tracing::debug!("Get group from cache: {}", cache_key);
                    return Ok(Some(group));
                }
            }
        }

        // 从数据库查询
        let group = sqlx::query_as::<_, Group>(&format!(
            "SELECT {GROUP_COLUMNS} FROM small_groups WHERE id = $1"
        ))
        .bind(group_id)
        .fetch_optional(pool)
        .await?;

        // 缓存结果
        if let Some(ref g) = group {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(g) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, GROUP_CACHE_EXPIRE).await;
                    tracing::debug!("Set group to cache: {}", cache_key);
                }
            }
        }

        Ok(group)
    }

    pub async fn update(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
        req: &UpdateGroupRequest,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE small_groups
            SET name = $1, short_description = $2, full_description = $3, max_member_count = $4
            WHERE id = $5
            "#,
        )
        .bind(req.name.trim())
        .bind(req.short_description.as_deref().unwrap_or(""))
        .bind(req.full_description.as_deref().unwrap_or(""))
        .bind(req.max_member_count)
        .bind(group_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("小组不存在"));
        }

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn delete(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM small_groups WHERE id = $1")
            .bind(group_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("小组不存在"));
        }

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    /// 公开小组。数据库层再拦一次已关闭的小组，防止和 close 并发竞争
    pub async fn mark_published(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE small_groups
            SET published = TRUE, published_at = NOW()
            WHERE id = $1 AND closed = FALSE
            "#,
        )
        .bind(group_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState("小组已关闭，无法公开"));
        }

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn open_recruiting(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
        recruiting_type: RecruitingType,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE small_groups
            SET recruiting = TRUE, recruiting_type = $1, recruiting_updated_at = NOW()
            WHERE id = $2 AND closed = FALSE
            "#,
        )
        .bind(recruiting_type.as_str())
        .bind(group_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState("小组已关闭，无法开启招募"));
        }

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    /// 关闭小组，终态，重复关闭只刷新关闭时间
    pub async fn mark_closed(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: i64,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE small_groups SET closed = TRUE, closed_at = NOW() WHERE id = $1",
        )
        .bind(group_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("小组不存在"));
        }

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn member_count(pool: &PgPool, group_id: i64) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM group_members WHERE group_id = $1")
                .bind(group_id)
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    pub async fn members(pool: &PgPool, group_id: i64) -> Result<Vec<GroupMemberInfo>, AppError> {
        let members = sqlx::query_as::<_, GroupMemberInfo>(
            r#"
            SELECT gm.member_id, m.username, m.profile_image, gm.role, gm.joined_at
            FROM group_members gm
            JOIN members m ON m.id = gm.member_id
            WHERE gm.group_id = $1
            ORDER BY gm.joined_at
            "#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;
        Ok(members)
    }

    /// 成员退出小组。组长没有成员记录，走到这里会按"不是成员"处理
    pub async fn leave(pool: &PgPool, group_id: i64, member_id: i64) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND member_id = $2")
                .bind(group_id)
                .bind(member_id)
                .execute(pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState("不是小组成员"));
        }

        Ok(())
    }

    pub async fn remove_member(
        pool: &PgPool,
        group_id: i64,
        member_id: i64,
    ) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND member_id = $2")
                .bind(group_id)
                .bind(member_id)
                .execute(pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("小组成员不存在"));
        }

        Ok(())
    }

    pub async fn set_member_role(
        pool: &PgPool,
        group_id: i64,
        member_id: i64,
        role: MemberRole,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE group_members SET role = $1 WHERE group_id = $2 AND member_id = $3",
        )
        .bind(role.as_str())
        .bind(group_id)
        .bind(member_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("小组成员不存在"));
        }

        Ok(())
    }

    /// 小组记录变更后清除详情缓存，缓存异常只记日志
    ///
    /// 成员表的增删不影响缓存内容，成员数每次都从数据库现查。
    pub(crate) async fn invalidate_cache(redis: &Arc<RedisClient>, group_id: i64) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);
            let deleted: Result<(), redis::RedisError> = conn.del(&cache_key).await;
            if let Err(e) = deleted {
                tracing::warn!("Failed to invalidate group cache {}: {}", cache_key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(published: bool, recruiting: bool, closed: bool) -> Group {
        Group {
            id: 1,
            name: "登山小组".into(),
            short_description: "周末登山".into(),
            full_description: String::new(),
            leader_id: 10,
            max_member_count: 5,
            published,
            recruiting,
            closed,
            recruiting_type: None,
            published_at: None,
            recruiting_updated_at: None,
            closed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn is_leader_matches_leader_id_only() {
        let g = group(false, false, false);
        assert!(g.is_leader(10));
        assert!(!g.is_leader(11));
    }

    #[test]
    fn into_info_derives_status_and_joinability() {
        let info = group(true, true, false).into_info(3);
        assert_eq!(info.status, "RECRUITING");
        assert!(info.is_joinable);
        assert_eq!(info.current_member_count, 3);

        let info = group(true, true, true).into_info(5);
        assert_eq!(info.status, "CLOSED");
        assert!(!info.is_joinable);
    }

    #[test]
    fn member_role_parse() {
        assert_eq!(MemberRole::parse("MEMBER").unwrap(), MemberRole::Member);
        assert_eq!(MemberRole::parse("MANAGER").unwrap(), MemberRole::Manager);
        assert!(matches!(
            MemberRole::parse("OWNER"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn create_request_validation() {
        let req = CreateGroupRequest {
            name: "  ".into(),
            short_description: None,
            full_description: None,
            max_member_count: 5,
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));

        let req = CreateGroupRequest {
            name: "读书会".into(),
            short_description: None,
            full_description: None,
            max_member_count: 0,
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));

        let req = CreateGroupRequest {
            name: "读书会".into(),
            short_description: Some("每周一本".into()),
            full_description: None,
            max_member_count: 1,
        };
        assert!(req.validate().is_ok());
    }
}
