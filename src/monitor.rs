//! Price Monitor / Exit State Machine
//!
//! [`ExitStateMachine`] is the pure decision core: it consumes one P&L
//! sample per tick and answers hold, partial exit or full exit. Checks run
//! in this order every tick:
//!
//! 1. stop loss (P&L below `-stop_loss`)
//! 2. tier-2 take profit (P&L above `take_profit2`)
//! 3. tier-1 partial exit (P&L above `take_profit1`, once)
//! 4. tier-1 retrace (after the partial, P&L below `take_profit1 - retrace_buffer`)
//! 5. tick budget exhausted
//!
//! A tick without a price sample (quote lookup failed) still consumes
//! budget. On the last tick the timeout exit replaces a tier-1 partial,
//! since the full sale covers it. A partial exit whose sell never lands is
//! reported back with [`ExitStateMachine::partial_failed`]: the tier-1 flag
//! is cleared, so no retrace exit fires for a gain that was never taken and
//! the partial is tried again on the next tick above tier 1.
//!
//! [`PriceMonitor`] drives the machine on a `tokio` interval, executes the
//! decisions through the [`SellExecutor`] and listens for an operator
//! "sell now" signal between ticks.

use crate::chain::ChainReader;
use crate::config::Thresholds;
use crate::errors::SellError;
use crate::metrics::metrics;
use crate::sell_executor::{SellExecutor, SellOutcome};
use crate::structured_logging::PipelineContext;
use crate::swap::QuoteSource;
use crate::types::TradeState;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Tier1Retrace,
    Timeout,
    Manual,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Tier1Retrace => "tier1_retrace",
            ExitReason::Timeout => "timeout",
            ExitReason::Manual => "manual",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Hold,
    /// Sell `fraction` of the held tokens and keep monitoring
    PartialExit { fraction: f64 },
    /// Sell everything and stop
    FullExit(ExitReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Armed,
    Monitoring,
    Exited(ExitReason),
}

/// Exit thresholds in percent, plus the tick budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitThresholds {
    pub take_profit1: f64,
    pub take_profit2: f64,
    pub stop_loss: f64,
    pub retrace_buffer: f64,
    pub sell_fraction: f64,
    pub max_ticks: u32,
}

impl From<&Thresholds> for ExitThresholds {
    fn from(t: &Thresholds) -> Self {
        let interval = t.price_check_interval.as_millis().max(1);
        let ticks = (t.price_check_duration.as_millis() / interval).max(1);
        Self {
            take_profit1: t.take_profit1,
            take_profit2: t.take_profit2,
            stop_loss: t.stop_loss,
            retrace_buffer: t.retrace_buffer,
            sell_fraction: t.sell_fraction,
            max_ticks: u32::try_from(ticks).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExitStateMachine {
    thresholds: ExitThresholds,
    phase: MonitorPhase,
    partial_taken: bool,
    ticks: u32,
}

impl ExitStateMachine {
    pub fn new(thresholds: ExitThresholds) -> Self {
        Self {
            thresholds,
            phase: MonitorPhase::Armed,
            partial_taken: false,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn partial_taken(&self) -> bool {
        self.partial_taken
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Feed one tick; `pnl_percent` is `None` when no price was available
    pub fn on_tick(&mut self, pnl_percent: Option<f64>) -> ExitDecision {
        if let MonitorPhase::Exited(_) = self.phase {
            return ExitDecision::Hold;
        }
        self.phase = MonitorPhase::Monitoring;
        self.ticks += 1;

        let decision = match pnl_percent {
            Some(pnl) => self.evaluate(pnl),
            None => ExitDecision::Hold,
        };

        let decision = match decision {
            ExitDecision::FullExit(_) => decision,
            _ if self.ticks >= self.thresholds.max_ticks => ExitDecision::FullExit(ExitReason::Timeout),
            _ => decision,
        };

        match decision {
            ExitDecision::FullExit(reason) => self.phase = MonitorPhase::Exited(reason),
            ExitDecision::PartialExit { .. } => self.partial_taken = true,
            ExitDecision::Hold => {}
        }
        decision
    }

    /// The sell for the last partial exit did not land
    pub fn partial_failed(&mut self) {
        self.partial_taken = false;
    }

    /// Operator override; ends monitoring regardless of the tick count
    pub fn force_exit(&mut self) -> ExitDecision {
        if let MonitorPhase::Exited(_) = self.phase {
            return ExitDecision::Hold;
        }
        self.phase = MonitorPhase::Exited(ExitReason::Manual);
        ExitDecision::FullExit(ExitReason::Manual)
    }

    fn evaluate(&self, pnl: f64) -> ExitDecision {
        let t = &self.thresholds;
        if pnl < -t.stop_loss {
            return ExitDecision::FullExit(ExitReason::StopLoss);
        }
        if pnl > t.take_profit2 {
            return ExitDecision::FullExit(ExitReason::TakeProfit);
        }
        if !self.partial_taken && pnl > t.take_profit1 {
            return ExitDecision::PartialExit {
                fraction: t.sell_fraction,
            };
        }
        if self.partial_taken && pnl < t.take_profit1 - t.retrace_buffer {
            return ExitDecision::FullExit(ExitReason::Tier1Retrace);
        }
        ExitDecision::Hold
    }
}

/// How a monitored position ended
#[derive(Debug)]
pub enum MonitorOutcome {
    Closed(ExitReason),
    /// The final sell left tokens behind
    Incomplete { reason: ExitReason, error: SellError },
}

pub struct PriceMonitor {
    reader: Arc<dyn ChainReader>,
    quotes: Arc<dyn QuoteSource>,
    seller: Arc<SellExecutor>,
    thresholds: ExitThresholds,
    interval: Duration,
}

impl PriceMonitor {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        quotes: Arc<dyn QuoteSource>,
        seller: Arc<SellExecutor>,
        thresholds: &Thresholds,
    ) -> Self {
        Self {
            reader,
            quotes,
            seller,
            thresholds: ExitThresholds::from(thresholds),
            interval: thresholds.price_check_interval,
        }
    }

    pub fn thresholds(&self) -> &ExitThresholds {
        &self.thresholds
    }

    /// Monitor `trade` until it is fully exited
    pub async fn run(
        &self,
        trade: &mut TradeState,
        mut sell_now: watch::Receiver<bool>,
        ctx: &PipelineContext,
    ) -> MonitorOutcome {
        let mut machine = ExitStateMachine::new(self.thresholds);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a tokio interval completes immediately
        ticker.tick().await;

        let mut signal_open = true;
        if *sell_now.borrow_and_update() {
            let decision = machine.force_exit();
            if let Some(outcome) = self.apply(decision, &mut machine, trade, None, ctx).await {
                return outcome;
            }
        }

        info!(
            mint = %trade.mint,
            max_ticks = self.thresholds.max_ticks,
            interval_ms = self.interval.as_millis() as u64,
            "Price monitor armed"
        );

        loop {
            let (decision, pnl) = tokio::select! {
                biased;
                changed = sell_now.changed(), if signal_open => {
                    match changed {
                        Ok(()) if *sell_now.borrow_and_update() => {
                            info!(mint = %trade.mint, "Sell-now signal received");
                            (machine.force_exit(), None)
                        }
                        Ok(()) => continue,
                        Err(_) => {
                            signal_open = false;
                            continue;
                        }
                    }
                }
                _ = ticker.tick() => {
                    let pnl = self.current_pnl(trade).await;
                    trade.checks_elapsed += 1;
                    debug!(
                        mint = %trade.mint,
                        tick = trade.checks_elapsed,
                        pnl = ?pnl,
                        "Monitor tick"
                    );
                    (machine.on_tick(pnl), pnl)
                }
            };

            if let Some(outcome) = self.apply(decision, &mut machine, trade, pnl, ctx).await {
                return outcome;
            }
        }
    }

    /// Execute a decision; `Some` once the position is finished
    async fn apply(
        &self,
        decision: ExitDecision,
        machine: &mut ExitStateMachine,
        trade: &mut TradeState,
        pnl: Option<f64>,
        ctx: &PipelineContext,
    ) -> Option<MonitorOutcome> {
        match decision {
            ExitDecision::Hold => None,
            ExitDecision::PartialExit { fraction } => {
                ctx.logger
                    .log_exit(&trade.mint, "partial", pnl.unwrap_or_default());
                self.partial_exit(machine, trade, fraction, ctx).await
            }
            ExitDecision::FullExit(reason) => {
                ctx.logger
                    .log_exit(&trade.mint, reason.as_str(), pnl.unwrap_or_default());
                Some(self.full_exit(trade, reason, ctx).await)
            }
        }
    }

    async fn partial_exit(
        &self,
        machine: &mut ExitStateMachine,
        trade: &mut TradeState,
        fraction: f64,
        ctx: &PipelineContext,
    ) -> Option<MonitorOutcome> {
        let amount = (trade.remaining_tokens as f64 * fraction).floor() as u64;
        match self
            .seller
            .sell(&trade.pool_keys, &trade.token_account, amount, false, ctx)
            .await
        {
            Ok(SellOutcome::Partial { amount: sold, .. }) => {
                metrics().partial_exits.inc();
                trade.partial_taken = true;
                trade.remaining_tokens = match self.reader.token_balance(&trade.token_account).await {
                    Ok(balance) => balance,
                    Err(_) => trade.remaining_tokens.saturating_sub(sold),
                };
                info!(
                    mint = %trade.mint,
                    sold,
                    remaining = trade.remaining_tokens,
                    "Tier-1 partial exit done"
                );
                if trade.remaining_tokens == 0 {
                    metrics()
                        .full_exits
                        .with_label_values(&[ExitReason::TakeProfit.as_str()])
                        .inc();
                    return Some(MonitorOutcome::Closed(ExitReason::TakeProfit));
                }
                None
            }
            Ok(_) => None,
            Err(e) => {
                // Monitoring goes on; the final sell still drains the account
                warn!(mint = %trade.mint, error = %e, "Partial exit failed");
                machine.partial_failed();
                None
            }
        }
    }

    async fn full_exit(
        &self,
        trade: &mut TradeState,
        reason: ExitReason,
        ctx: &PipelineContext,
    ) -> MonitorOutcome {
        match self
            .seller
            .sell(
                &trade.pool_keys,
                &trade.token_account,
                trade.remaining_tokens,
                true,
                ctx,
            )
            .await
        {
            Ok(_) => {
                trade.remaining_tokens = 0;
                metrics()
                    .full_exits
                    .with_label_values(&[reason.as_str()])
                    .inc();
                info!(mint = %trade.mint, reason = %reason, "🏁 Position closed");
                MonitorOutcome::Closed(reason)
            }
            Err(e) => {
                error!(mint = %trade.mint, reason = %reason, error = %e, "Final sell incomplete");
                MonitorOutcome::Incomplete { reason, error: e }
            }
        }
    }

    async fn current_pnl(&self, trade: &TradeState) -> Option<f64> {
        match self
            .quotes
            .quote_sell(&trade.pool_keys, trade.remaining_tokens)
            .await
        {
            Ok(quote) => Some(trade.pnl_percent(quote.min_amount_out)),
            Err(e) => {
                warn!(mint = %trade.mint, error = %e, "Price lookup failed, tick skipped");
                None
            }
        }
    }
}
