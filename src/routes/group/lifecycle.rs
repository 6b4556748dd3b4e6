use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// 小组状态，由三个生命周期标志按优先级推导，不单独落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    BeforeOpen,
    Published,
    Recruiting,
    Closed,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupStatus::BeforeOpen => "BEFORE_OPEN",
            GroupStatus::Published => "PUBLISHED",
            GroupStatus::Recruiting => "RECRUITING",
            GroupStatus::Closed => "CLOSED",
        }
    }
}

/// 招募方式，只在招募开启期间有意义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecruitingType {
    Approval,
    FirstCome,
}

impl RecruitingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecruitingType::Approval => "APPROVAL",
            RecruitingType::FirstCome => "FIRST_COME",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "APPROVAL" => Ok(RecruitingType::Approval),
            "FIRST_COME" => Ok(RecruitingType::FirstCome),
            _ => Err(AppError::Validation(format!("未知的招募方式: {}", s))),
        }
    }
}

/// 小组生命周期标志位
///
/// 标志只会向前推进：published/recruiting 一旦置位不会在这里清除，
/// closed 置位后任何转换都不再允许。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    pub published: bool,
    pub recruiting: bool,
    pub closed: bool,
}

impl Lifecycle {
    pub fn new(published: bool, recruiting: bool, closed: bool) -> Self {
        Self {
            published,
            recruiting,
            closed,
        }
    }

    /// 推导状态，优先级 closed > recruiting > published。
    ///
    /// recruiting 在 published 之前判断：未公开但已开启招募的小组
    /// 状态显示为 RECRUITING，这是沿用的线上行为。
    pub fn status(&self) -> GroupStatus {
        if self.closed {
            return GroupStatus::Closed;
        }
        if self.recruiting {
            return GroupStatus::Recruiting;
        }
        if self.published {
            return GroupStatus::Published;
        }
        GroupStatus::BeforeOpen
    }

    /// 公开小组，重复调用只会刷新公开时间
    pub fn publish(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::InvalidState("小组已关闭，无法公开"));
        }
        self.published = true;
        Ok(())
    }

    /// 开启招募，未公开的小组也允许开启
    pub fn open_recruiting(&mut self) -> Result<(), AppError> {
        if self.closed {
            return Err(AppError::InvalidState("小组已关闭，无法开启招募"));
        }
        self.recruiting = true;
        Ok(())
    }

    /// 关闭小组，终态
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// 是否接受加入申请，容量另行在审批时校验
    pub fn is_joinable(&self) -> bool {
        self.published && self.recruiting && !self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_defaults_to_before_open() {
        assert_eq!(Lifecycle::default().status(), GroupStatus::BeforeOpen);
    }

    #[test]
    fn status_precedence_closed_wins() {
        let lifecycle = Lifecycle::new(true, true, true);
        assert_eq!(lifecycle.status(), GroupStatus::Closed);
    }

    #[test]
    fn recruiting_reported_even_when_unpublished() {
        // 未公开但 recruiting 置位，状态仍是 RECRUITING
        let lifecycle = Lifecycle::new(false, true, false);
        assert_eq!(lifecycle.status(), GroupStatus::Recruiting);
    }

    #[test]
    fn published_without_recruiting() {
        let lifecycle = Lifecycle::new(true, false, false);
        assert_eq!(lifecycle.status(), GroupStatus::Published);
    }

    #[test]
    fn publish_is_repeatable() {
        let mut lifecycle = Lifecycle::default();
        assert!(lifecycle.publish().is_ok());
        assert!(lifecycle.publish().is_ok());
        assert!(lifecycle.published);
    }

    #[test]
    fn closed_group_rejects_publish_and_recruiting() {
        let mut lifecycle = Lifecycle::new(true, true, false);
        lifecycle.close();

        assert!(matches!(
            lifecycle.publish(),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(
            lifecycle.open_recruiting(),
            Err(AppError::InvalidState(_))
        ));
        // 失败的转换不应改变标志
        assert!(lifecycle.closed);
        assert_eq!(lifecycle.status(), GroupStatus::Closed);
    }

    #[test]
    fn close_is_terminal() {
        let mut lifecycle = Lifecycle::new(true, true, false);
        lifecycle.close();
        lifecycle.close();
        assert!(lifecycle.closed);
        assert!(!lifecycle.is_joinable());
    }

    #[test]
    fn joinable_requires_published_and_recruiting_and_open() {
        assert!(Lifecycle::new(true, true, false).is_joinable());
        assert!(!Lifecycle::new(true, false, false).is_joinable());
        assert!(!Lifecycle::new(false, true, false).is_joinable());
        assert!(!Lifecycle::new(true, true, true).is_joinable());
    }

    #[test]
    fn recruiting_type_parse_round_trip() {
        assert_eq!(
            RecruitingType::parse("APPROVAL").unwrap(),
            RecruitingType::Approval
        );
        assert_eq!(
            RecruitingType::parse(RecruitingType::FirstCome.as_str()).unwrap(),
            RecruitingType::FirstCome
        );
        assert!(matches!(
            RecruitingType::parse("INVITE_ONLY"),
            Err(AppError::Validation(_))
        ));
    }
}
