//! 检查生命周期服务
//!
//! 在仓储层之上实施检查状态机，每个转换执行前先咨询访问控制策略，
//! 拒绝即短路，不读写任何状态。

use crate::ai_report::synthesize_ai_report;
use crate::state_machine::{StudyEvent, StudyStateMachine};
use telerad_core::access::{self, Action, Ownership, Principal};
use telerad_core::{
    AiReport, FinalReport, ReportRevision, Result, Study, StudyStatus, TeleradError,
};
use telerad_core::utils::generate_display_id;
use telerad_database::{
    DatabasePool, ListOrder, NewFinalReport, NewStudy, NewStudyFile, StudyFilter, StudyQueries,
};
use uuid::Uuid;

/// displayId 碰撞重试上限
const DISPLAY_ID_RETRIES: usize = 8;

/// 上传检查请求
#[derive(Debug)]
pub struct UploadStudyRequest {
    pub patient_name: String,
    pub patient_age: i32,
    pub patient_gender: String,
    pub modality: String,
    pub notes: Option<String>,
}

/// 上传的影像文件
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// 创建/编辑最终报告请求
#[derive(Debug)]
pub struct CreateFinalReportRequest {
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
}

/// 检查生命周期服务
pub struct StudyLifecycle {
    db: DatabasePool,
    state_machine: StudyStateMachine,
}

impl StudyLifecycle {
    pub fn new(db: DatabasePool) -> Self {
        Self {
            db,
            state_machine: StudyStateMachine::new(),
        }
    }

    /// 上传检查: 创建检查记录、挂接文件、合成AI初步报告
    pub async fn upload_study(
        &self,
        actor: &Principal,
        request: UploadStudyRequest,
        files: Vec<UploadedFile>,
    ) -> Result<Study> {
        if !access::allow(actor.role, Action::UploadStudy, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only technicians can upload studies".to_string(),
            ));
        }

        let centre_id = actor.centre_id.ok_or_else(|| {
            TeleradError::Validation("Technician is not attached to a centre".to_string())
        })?;

        let queries = StudyQueries::new(&self.db);
        let display_id = self.allocate_display_id(&queries).await?;

        let study = NewStudy {
            id: Uuid::new_v4(),
            display_id,
            patient_name: request.patient_name,
            patient_age: request.patient_age,
            patient_gender: request.patient_gender,
            modality: request.modality,
            centre_id,
            technician_id: actor.id,
            notes: request.notes,
        };

        let ai_report = synthesize_ai_report(&study.modality);
        let files: Vec<NewStudyFile> = files
            .into_iter()
            .map(|f| NewStudyFile {
                id: Uuid::new_v4(),
                file_name: f.file_name,
                content_type: f.content_type,
                content: f.content,
            })
            .collect();

        let created = queries
            .insert_study_with_artifacts(&study, &ai_report, &files)
            .await?;

        tracing::info!(
            "Study {} uploaded by technician {} ({} files)",
            created.display_id,
            actor.id,
            created.file_refs.len()
        );
        Ok(created)
    }

    /// 放射科医生认领检查
    pub async fn assign(&self, actor: &Principal, display_id: &str) -> Result<Study> {
        if !access::allow(actor.role, Action::AssignStudy, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only radiologists can assign studies to themselves".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        self.state_machine.transition(study.status, &StudyEvent::Assign)?;

        if !queries.assign(display_id, actor.id, study.status).await? {
            return Err(TeleradError::InvalidState(
                "Study was modified concurrently".to_string(),
            ));
        }

        tracing::info!("Study {} assigned to radiologist {}", display_id, actor.id);
        self.get_study(&queries, display_id).await
    }

    /// 创建最终报告，检查转为completed
    pub async fn create_final_report(
        &self,
        actor: &Principal,
        display_id: &str,
        request: CreateFinalReportRequest,
    ) -> Result<FinalReport> {
        if !access::allow(actor.role, Action::CreateFinalReport, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only radiologists can create final reports".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        self.state_machine
            .transition(study.status, &StudyEvent::FileFinalReport)?;

        let report = NewFinalReport {
            id: Uuid::new_v4(),
            study_id: study.id,
            radiologist_id: actor.id,
            findings: request.findings,
            diagnosis: request.diagnosis,
            recommendations: request.recommendations,
        };

        let created = queries
            .complete_with_final_report(&report, study.status)
            .await?
            .ok_or_else(|| {
                TeleradError::InvalidState("Study was modified concurrently".to_string())
            })?;

        tracing::info!(
            "Final report {} filed for study {} by radiologist {}",
            created.id,
            display_id,
            actor.id
        );
        Ok(created)
    }

    /// 编辑最终报告: 旧内容追加到修订历史后覆盖
    pub async fn edit_final_report(
        &self,
        actor: &Principal,
        display_id: &str,
        request: CreateFinalReportRequest,
    ) -> Result<FinalReport> {
        if !access::allow(actor.role, Action::EditFinalReport, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only radiologists can edit final reports".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        if study.final_report_id.is_none() {
            return Err(TeleradError::InvalidState(
                "Study has no final report to edit".to_string(),
            ));
        }

        let updated = queries
            .edit_final_report(
                study.id,
                &request.findings,
                &request.diagnosis,
                request.recommendations.as_deref(),
                actor.id,
            )
            .await?
            .ok_or_else(|| TeleradError::NotFound("Final report not found".to_string()))?;

        tracing::info!("Final report for study {} edited by {}", display_id, actor.id);
        Ok(updated)
    }

    /// 标记为草稿
    pub async fn mark_draft(&self, actor: &Principal, display_id: &str) -> Result<Study> {
        self.set_draft_flag(actor, display_id, Action::MarkDraft, &StudyEvent::MarkDraft, true)
            .await
    }

    /// 取消草稿标记
    pub async fn unmark_draft(&self, actor: &Principal, display_id: &str) -> Result<Study> {
        self.set_draft_flag(actor, display_id, Action::UnmarkDraft, &StudyEvent::UnmarkDraft, false)
            .await
    }

    async fn set_draft_flag(
        &self,
        actor: &Principal,
        display_id: &str,
        action: Action,
        event: &StudyEvent,
        is_draft: bool,
    ) -> Result<Study> {
        // 非技师在读状态之前即被拒绝
        if !access::allow(actor.role, action, Ownership::Owner) {
            return Err(TeleradError::Forbidden(
                "Only technicians can change draft state".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        if !access::allow(actor.role, action, ownership_of(&study, actor)) {
            return Err(TeleradError::Forbidden(
                "Technicians can only modify their own studies".to_string(),
            ));
        }

        let next = self.state_machine.transition(study.status, event)?;

        if !queries
            .set_draft(display_id, is_draft, study.status, next)
            .await?
        {
            return Err(TeleradError::InvalidState(
                "Study was modified concurrently".to_string(),
            ));
        }

        self.get_study(&queries, display_id).await
    }

    /// 申请删除检查
    pub async fn request_delete(&self, actor: &Principal, display_id: &str) -> Result<Study> {
        if !access::allow(actor.role, Action::RequestDelete, Ownership::Owner) {
            return Err(TeleradError::Forbidden(
                "Only technicians can request study deletion".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        if !access::allow(actor.role, Action::RequestDelete, ownership_of(&study, actor)) {
            return Err(TeleradError::Forbidden(
                "Technicians can only request deletion of their own studies".to_string(),
            ));
        }

        if !queries.request_delete(display_id, actor.id).await? {
            return Err(TeleradError::InvalidState(
                "Deletion already requested for this study".to_string(),
            ));
        }

        tracing::info!("Deletion of study {} requested by {}", display_id, actor.id);
        self.get_study(&queries, display_id).await
    }

    /// 审批删除: 检查、文件引用、AI报告、最终报告一并删除
    pub async fn approve_delete(&self, actor: &Principal, display_id: &str) -> Result<()> {
        if !access::allow(actor.role, Action::ApproveDelete, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only admins or centres can approve deletion".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        if !study.delete_requested {
            return Err(TeleradError::InvalidState(
                "No deletion request pending for this study".to_string(),
            ));
        }

        if !queries.approve_delete(study.id).await? {
            return Err(TeleradError::InvalidState(
                "Deletion request was withdrawn concurrently".to_string(),
            ));
        }

        tracing::info!("Study {} deleted (approved by {})", display_id, actor.id);
        Ok(())
    }

    /// 驳回删除申请: 仅清除标记，状态保持不变
    pub async fn reject_delete(&self, actor: &Principal, display_id: &str) -> Result<Study> {
        if !access::allow(actor.role, Action::RejectDelete, Ownership::NotApplicable) {
            return Err(TeleradError::Forbidden(
                "Only admins or centres can reject deletion".to_string(),
            ));
        }

        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;

        if !study.delete_requested {
            return Err(TeleradError::InvalidState(
                "No deletion request pending for this study".to_string(),
            ));
        }

        if !queries.reject_delete(display_id).await? {
            return Err(TeleradError::InvalidState(
                "Deletion request was resolved concurrently".to_string(),
            ));
        }

        tracing::info!("Deletion of study {} rejected by {}", display_id, actor.id);
        self.get_study(&queries, display_id).await
    }

    // ========== 查询操作 ==========

    /// 按编号获取检查
    pub async fn get(&self, display_id: &str) -> Result<Study> {
        let queries = StudyQueries::new(&self.db);
        self.get_study(&queries, display_id).await
    }

    /// 按角色范围列出检查
    ///
    /// 技师和中心账号只能看到本中心的检查，放射科医生看到自己名下的，
    /// 管理员不受限制。
    pub async fn list(
        &self,
        actor: &Principal,
        status: Option<StudyStatus>,
        order: ListOrder,
        limit: i64,
    ) -> Result<Vec<Study>> {
        let mut filter = StudyFilter {
            status,
            ..Default::default()
        };

        match actor.role {
            telerad_core::Role::Technician | telerad_core::Role::Centre => {
                filter.centre_id = actor.centre_id;
            }
            telerad_core::Role::Radiologist => {
                filter.radiologist_id = Some(actor.id);
            }
            _ => {}
        }

        let queries = StudyQueries::new(&self.db);
        queries.list(&filter, order, limit).await
    }

    /// 获取检查的AI初步报告
    pub async fn get_ai_report(&self, display_id: &str) -> Result<AiReport> {
        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;
        queries
            .get_ai_report(study.id)
            .await?
            .ok_or_else(|| TeleradError::NotFound("AI report not available".to_string()))
    }

    /// 获取检查的最终报告
    pub async fn get_final_report(&self, display_id: &str) -> Result<FinalReport> {
        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;
        queries
            .get_final_report(study.id)
            .await?
            .ok_or_else(|| TeleradError::NotFound("Final report not available".to_string()))
    }

    /// 获取最终报告的修订历史
    pub async fn get_report_revisions(&self, display_id: &str) -> Result<Vec<ReportRevision>> {
        let queries = StudyQueries::new(&self.db);
        let study = self.get_study(&queries, display_id).await?;
        let report_id = study.final_report_id.ok_or_else(|| {
            TeleradError::NotFound("Final report not available".to_string())
        })?;
        queries.get_report_revisions(report_id).await
    }

    async fn get_study(&self, queries: &StudyQueries<'_>, display_id: &str) -> Result<Study> {
        queries
            .get_by_display_id(display_id)
            .await?
            .ok_or_else(|| TeleradError::NotFound(format!("Study {} not found", display_id)))
    }

    /// 生成未占用的检查编号，有限次重试后放弃
    ///
    /// 并发窗口由studies.display_id上的唯一索引兜底。
    async fn allocate_display_id(&self, queries: &StudyQueries<'_>) -> Result<String> {
        for _ in 0..DISPLAY_ID_RETRIES {
            let candidate = generate_display_id();
            if !queries.display_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::warn!("Display id collision on {}, retrying", candidate);
        }
        Err(TeleradError::Internal(
            "Failed to allocate a unique display id".to_string(),
        ))
    }
}

/// 判断操作者与检查的归属关系
fn ownership_of(study: &Study, actor: &Principal) -> Ownership {
    if study.technician_id == actor.id {
        Ownership::Owner
    } else {
        Ownership::NotOwner
    }
}
