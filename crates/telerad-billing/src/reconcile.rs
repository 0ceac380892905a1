//! 支付状态对账
//!
//! 网关通过两条独立通道上报同一会话的状态: 客户端触发的轮询和网关推送的
//! 异步回调。两者可能以任意顺序、任意次数、在不同服务实例上到达。
//! 对账把支付状态当作单调格上的点处理: 只向上推进，终态互斥且不可离开；
//! 推进到paid时对账单执行至多一次的已支付标记。

use crate::gateway::PaymentGateway;
use crate::store::PaymentStore;
use std::sync::Arc;
use telerad_core::{PaymentStatus, PaymentTransaction, Result, TeleradError};

/// CAS落败后重读重试的上限。格高为2，正常情况两轮内必然收敛。
const SETTLE_ATTEMPTS: usize = 4;

/// 对观测到的状态作出的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// 无事可做: 重复上报、过期上报或状态回退
    Ignore,
    /// 把存储状态推进到观测状态
    Advance(PaymentStatus),
}

/// 纯合并决策: 比较存储状态与观测状态在格上的高度
///
/// - 相同状态重复上报 -> Ignore（幂等）
/// - 存储状态已是终态 -> Ignore（终态不可离开，迟到的轮询不能降级回调已定的结果）
/// - 观测状态不高于存储状态 -> Ignore（不回退）
/// - 其余 -> Advance
pub fn decide(current: PaymentStatus, observed: PaymentStatus) -> ReconcileAction {
    if observed == current {
        return ReconcileAction::Ignore;
    }
    if current.is_terminal() {
        return ReconcileAction::Ignore;
    }
    if observed.rank() <= current.rank() {
        return ReconcileAction::Ignore;
    }
    ReconcileAction::Advance(observed)
}

/// 支付对账器
pub struct PaymentReconciler {
    store: Arc<dyn PaymentStore>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// 把一次状态观测合并进支付流水与账单
    ///
    /// 幂等；写入是对流水状态的一次compare-and-set。CAS落败说明另一通道
    /// 并发推进了状态，此时重读重判: 并发推进可能低于本次观测（轮询抢在
    /// 回调之前落了pending），观测不能因此丢失，只有当观测在重读后的状态
    /// 之下时才归于无操作。存储状态为paid时总是补一次账单的条件更新，
    /// 标记本身至多真正生效一次。
    pub async fn apply_status(
        &self,
        session_id: &str,
        observed: PaymentStatus,
    ) -> Result<PaymentTransaction> {
        for _ in 0..SETTLE_ATTEMPTS {
            let txn = self.load(session_id).await?;

            let next = match decide(txn.payment_status, observed) {
                ReconcileAction::Ignore => {
                    tracing::debug!(
                        "Session {}: observed {} ignored (stored {})",
                        session_id,
                        observed.as_str(),
                        txn.payment_status.as_str()
                    );
                    // 流水已是paid时补对账单，容忍标记前的中途失败
                    if txn.payment_status == PaymentStatus::Paid {
                        self.settle_invoice(&txn).await?;
                    }
                    return Ok(txn);
                }
                ReconcileAction::Advance(next) => next,
            };

            let advanced = self
                .store
                .cas_transaction_status(session_id, txn.payment_status, next)
                .await?;

            if !advanced {
                // 另一通道抢先推进，重读后重新合并本次观测
                tracing::debug!(
                    "Session {}: concurrent update won over {}, re-merging observation {}",
                    session_id,
                    txn.payment_status.as_str(),
                    observed.as_str()
                );
                continue;
            }

            tracing::info!(
                "Session {}: payment status {} -> {}",
                session_id,
                txn.payment_status.as_str(),
                next.as_str()
            );

            let txn = self.load(session_id).await?;
            if txn.payment_status == PaymentStatus::Paid {
                self.settle_invoice(&txn).await?;
            }
            return Ok(txn);
        }

        Err(TeleradError::Internal(format!(
            "Payment session {} did not settle after {} attempts",
            session_id, SETTLE_ATTEMPTS
        )))
    }

    /// 主动轮询网关并把结果并入本地状态
    ///
    /// 轮询超时不产生任何状态变更，重试是安全的。
    pub async fn poll(
        &self,
        gateway: &Arc<dyn PaymentGateway>,
        session_id: &str,
    ) -> Result<PaymentTransaction> {
        // 会话必须先在本地存在，避免替未知会话落状态
        self.load(session_id).await?;

        let observed = gateway.fetch_session_status(session_id).await?;
        self.apply_status(session_id, observed).await
    }

    /// 账单的已支付标记，条件更新落败即为无操作
    async fn settle_invoice(&self, txn: &PaymentTransaction) -> Result<()> {
        let marked = self.store.mark_invoice_paid(txn.invoice_id).await?;
        if marked {
            tracing::info!("Invoice {} marked as paid", txn.invoice_id);
        } else {
            tracing::debug!("Invoice {} was already paid", txn.invoice_id);
        }
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<PaymentTransaction> {
        self.store
            .get_transaction_by_session(session_id)
            .await?
            .ok_or_else(|| {
                TeleradError::NotFound(format!("Unknown payment session {}", session_id))
            })
    }
}
