//! 访问控制策略
//!
//! 纯决策函数: (角色, 操作, 资源归属) -> 允许/拒绝。无状态、无I/O。

use crate::models::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 发起操作的主体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
    pub centre_id: Option<Uuid>,
}

/// 受策略保护的操作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    CreateCentre,
    CreateBillingRate,
    EditBillingRate,
    GenerateInvoice,
    MarkInvoicePaid,
    ApproveDelete,
    RejectDelete,
    UploadStudy,
    RequestDelete,
    MarkDraft,
    UnmarkDraft,
    AssignStudy,
    CreateFinalReport,
    EditFinalReport,
    ToggleUserActive,
}

/// 资源归属关系
///
/// 技师只能操作自己上传的检查，其余操作与归属无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// 操作者即资源创建者
    Owner,
    /// 操作者不是资源创建者
    NotOwner,
    /// 该操作不涉及归属判断
    NotApplicable,
}

/// 判定角色是否允许执行操作
///
/// 规则表:
/// - 创建中心 / 创建和编辑费率 / 生成账单 / 标记账单已支付: 仅管理员
/// - 审批或驳回删除申请: 管理员或中心账号
/// - 上传检查 / 申请删除 / 标记草稿 / 取消草稿: 技师，且仅限本人上传的检查
/// - 认领检查 / 创建和编辑最终报告: 仅放射科医生
/// - 切换用户启用状态: 管理员或中心账号
/// - 其余一律拒绝
pub fn allow(role: Role, action: Action, ownership: Ownership) -> bool {
    use Action::*;

    match (role, action) {
        (
            Role::Admin,
            CreateCentre | CreateBillingRate | EditBillingRate | GenerateInvoice
            | MarkInvoicePaid | ApproveDelete | RejectDelete | ToggleUserActive,
        ) => true,
        (Role::Centre, ApproveDelete | RejectDelete | ToggleUserActive) => true,
        (Role::Technician, UploadStudy) => true,
        (Role::Technician, RequestDelete | MarkDraft | UnmarkDraft) => {
            ownership == Ownership::Owner
        }
        (Role::Radiologist, AssignStudy | CreateFinalReport | EditFinalReport) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROLES: [Role; 6] = [
        Role::Admin,
        Role::Centre,
        Role::Doctor,
        Role::Technician,
        Role::Radiologist,
        Role::Patient,
    ];

    const ALL_ACTIONS: [Action; 15] = [
        Action::CreateCentre,
        Action::CreateBillingRate,
        Action::EditBillingRate,
        Action::GenerateInvoice,
        Action::MarkInvoicePaid,
        Action::ApproveDelete,
        Action::RejectDelete,
        Action::UploadStudy,
        Action::RequestDelete,
        Action::MarkDraft,
        Action::UnmarkDraft,
        Action::AssignStudy,
        Action::CreateFinalReport,
        Action::EditFinalReport,
        Action::ToggleUserActive,
    ];

    #[test]
    fn test_admin_permissions() {
        for action in [
            Action::CreateCentre,
            Action::CreateBillingRate,
            Action::EditBillingRate,
            Action::GenerateInvoice,
            Action::MarkInvoicePaid,
            Action::ApproveDelete,
            Action::RejectDelete,
            Action::ToggleUserActive,
        ] {
            assert!(allow(Role::Admin, action, Ownership::NotApplicable));
        }

        // 管理员不能代替技师和医生执行业务操作
        assert!(!allow(Role::Admin, Action::UploadStudy, Ownership::NotApplicable));
        assert!(!allow(Role::Admin, Action::AssignStudy, Ownership::NotApplicable));
        assert!(!allow(Role::Admin, Action::CreateFinalReport, Ownership::NotApplicable));
    }

    #[test]
    fn test_centre_permissions() {
        assert!(allow(Role::Centre, Action::ApproveDelete, Ownership::NotApplicable));
        assert!(allow(Role::Centre, Action::RejectDelete, Ownership::NotApplicable));
        assert!(allow(Role::Centre, Action::ToggleUserActive, Ownership::NotApplicable));

        assert!(!allow(Role::Centre, Action::CreateCentre, Ownership::NotApplicable));
        assert!(!allow(Role::Centre, Action::GenerateInvoice, Ownership::NotApplicable));
        assert!(!allow(Role::Centre, Action::MarkInvoicePaid, Ownership::NotApplicable));
    }

    #[test]
    fn test_technician_ownership() {
        assert!(allow(Role::Technician, Action::UploadStudy, Ownership::NotApplicable));

        for action in [Action::RequestDelete, Action::MarkDraft, Action::UnmarkDraft] {
            assert!(allow(Role::Technician, action, Ownership::Owner));
            assert!(!allow(Role::Technician, action, Ownership::NotOwner));
            assert!(!allow(Role::Technician, action, Ownership::NotApplicable));
        }

        assert!(!allow(Role::Technician, Action::ApproveDelete, Ownership::Owner));
    }

    #[test]
    fn test_radiologist_permissions() {
        assert!(allow(Role::Radiologist, Action::AssignStudy, Ownership::NotApplicable));
        assert!(allow(Role::Radiologist, Action::CreateFinalReport, Ownership::NotApplicable));
        assert!(allow(Role::Radiologist, Action::EditFinalReport, Ownership::NotApplicable));

        assert!(!allow(Role::Radiologist, Action::UploadStudy, Ownership::NotApplicable));
        assert!(!allow(Role::Radiologist, Action::CreateBillingRate, Ownership::NotApplicable));
    }

    #[test]
    fn test_unlisted_roles_denied_everything() {
        // 规则表之外的角色对任何操作均无权限
        for role in [Role::Doctor, Role::Patient] {
            for action in ALL_ACTIONS {
                for ownership in [Ownership::Owner, Ownership::NotOwner, Ownership::NotApplicable]
                {
                    assert!(!allow(role, action, ownership));
                }
            }
        }
    }

    #[test]
    fn test_deny_is_the_default() {
        // 逐项核对: 允许的 (角色, 操作) 组合总数与规则表一致
        let mut allowed = 0;
        for role in ALL_ROLES {
            for action in ALL_ACTIONS {
                if allow(role, action, Ownership::Owner) {
                    allowed += 1;
                }
            }
        }
        // admin 8 + centre 3 + technician 4 + radiologist 3
        assert_eq!(allowed, 18);
    }
}
