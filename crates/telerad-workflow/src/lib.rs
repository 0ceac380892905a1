//! # Telerad Workflow
//!
//! 检查生命周期管理: 状态机、生命周期服务和AI初步报告生成。

pub mod ai_report;
pub mod lifecycle;
pub mod state_machine;

pub use ai_report::synthesize_ai_report;
pub use lifecycle::{CreateFinalReportRequest, StudyLifecycle, UploadStudyRequest, UploadedFile};
pub use state_machine::{StudyEvent, StudyStateMachine};
