//! 检查状态机
//!
//! 管理影像检查的生命周期状态转换: pending -> assigned -> completed，
//! pending与draft可互相切换。删除申请通过检查上的标记位表达，
//! 不改变状态本身。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use telerad_core::{Result, StudyStatus, TeleradError};

/// 检查状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StudyEvent {
    Assign,
    FileFinalReport,
    MarkDraft,
    UnmarkDraft,
}

/// 检查状态机
#[derive(Debug)]
pub struct StudyStateMachine {
    transitions: HashMap<(StudyStatus, StudyEvent), StudyStatus>,
}

impl StudyStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        // 定义状态转换规则
        transitions.insert((StudyStatus::Pending, StudyEvent::Assign), StudyStatus::Assigned);
        // 最终报告不要求检查已被认领，出报告即完成
        transitions.insert((StudyStatus::Pending, StudyEvent::FileFinalReport), StudyStatus::Completed);
        transitions.insert((StudyStatus::Assigned, StudyEvent::FileFinalReport), StudyStatus::Completed);
        transitions.insert((StudyStatus::Pending, StudyEvent::MarkDraft), StudyStatus::Draft);
        transitions.insert((StudyStatus::Draft, StudyEvent::UnmarkDraft), StudyStatus::Pending);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: StudyStatus, event: &StudyEvent) -> bool {
        self.transitions.contains_key(&(from, event.clone()))
    }

    /// 执行状态转换
    pub fn transition(&self, from: StudyStatus, event: &StudyEvent) -> Result<StudyStatus> {
        match self.transitions.get(&(from, event.clone())) {
            Some(to) => Ok(*to),
            None => Err(TeleradError::InvalidStateTransition {
                from: from.as_str().to_string(),
                event: format!("{:?}", event),
            }),
        }
    }

    /// 获取状态的所有可能事件
    pub fn possible_events(&self, current_state: StudyStatus) -> Vec<StudyEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| *state == current_state)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Default for StudyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = StudyStateMachine::new();

        assert!(sm.can_transition(StudyStatus::Pending, &StudyEvent::Assign));
        assert!(sm.can_transition(StudyStatus::Pending, &StudyEvent::FileFinalReport));
        assert!(sm.can_transition(StudyStatus::Assigned, &StudyEvent::FileFinalReport));
        assert!(sm.can_transition(StudyStatus::Pending, &StudyEvent::MarkDraft));
        assert!(sm.can_transition(StudyStatus::Draft, &StudyEvent::UnmarkDraft));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = StudyStateMachine::new();

        // completed是终态，不接受任何事件
        assert!(!sm.can_transition(StudyStatus::Completed, &StudyEvent::Assign));
        assert!(!sm.can_transition(StudyStatus::Completed, &StudyEvent::FileFinalReport));
        assert!(!sm.can_transition(StudyStatus::Completed, &StudyEvent::MarkDraft));

        // 草稿不能直接认领或出报告
        assert!(!sm.can_transition(StudyStatus::Draft, &StudyEvent::Assign));
        assert!(!sm.can_transition(StudyStatus::Draft, &StudyEvent::FileFinalReport));

        // 已分配的检查不能再标草稿
        assert!(!sm.can_transition(StudyStatus::Assigned, &StudyEvent::MarkDraft));
    }

    #[test]
    fn test_transition_execution() {
        let sm = StudyStateMachine::new();

        let result = sm.transition(StudyStatus::Pending, &StudyEvent::Assign);
        assert_eq!(result.unwrap(), StudyStatus::Assigned);

        let result = sm.transition(StudyStatus::Assigned, &StudyEvent::FileFinalReport);
        assert_eq!(result.unwrap(), StudyStatus::Completed);

        let result = sm.transition(StudyStatus::Completed, &StudyEvent::Assign);
        assert!(matches!(
            result,
            Err(TeleradError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_draft_round_trip() {
        let sm = StudyStateMachine::new();

        let draft = sm.transition(StudyStatus::Pending, &StudyEvent::MarkDraft).unwrap();
        assert_eq!(draft, StudyStatus::Draft);
        let back = sm.transition(draft, &StudyEvent::UnmarkDraft).unwrap();
        assert_eq!(back, StudyStatus::Pending);
    }

    #[test]
    fn test_possible_events() {
        let sm = StudyStateMachine::new();

        let events = sm.possible_events(StudyStatus::Pending);
        assert_eq!(events.len(), 3);
        assert!(events.contains(&StudyEvent::Assign));
        assert!(events.contains(&StudyEvent::FileFinalReport));
        assert!(events.contains(&StudyEvent::MarkDraft));

        assert!(sm.possible_events(StudyStatus::Completed).is_empty());
    }
}
