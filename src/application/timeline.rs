use crate::application::log_stream::LogStream;
use crate::config::{Config, Delays};
use crate::domain::log::{Agent, AgentLog, LogEntry, LogId};
use crate::domain::payment::{PaymentMethod, PurchaseMode, Receipt};
use crate::domain::ports::{IntentResponse, PaymentResponse};
use crate::domain::product::Product;
use crate::domain::step::Step;
use crate::error::Result;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Log entries of a response that are streamed as soon as it arrives; the rest follow
/// with the next reveal.
const EARLY_LOGS: usize = 2;

/// Something that happened to the timeline: a user action, a finished call, or an elapsed timer.
#[derive(Debug)]
pub enum Event {
    Submit { prompt: String, mode: PurchaseMode },
    IntentCompleted(Result<IntentResponse>),
    SelectProduct(Product),
    Proceed,
    Pay { method: PaymentMethod },
    PaymentCompleted(Result<PaymentResponse>),
    TimerElapsed(Timer),
    Restart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Timer {
    MerchantHandoff,
    RevealProducts,
    /// Carries the price captured when the purchase was decided.
    AutoPay { amount: Decimal },
    PaymentHandoff,
    RevealReceipt,
    RevealLog(LogId),
}

/// Work the timeline asks its driver to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SendIntent(String),
    /// Fire-and-forget; the driver never feeds the outcome back.
    UpdateProduct(Product),
    ProcessPayment { method: PaymentMethod, amount: Decimal },
    Schedule { after: Duration, timer: Timer },
    /// Drop every timer and call issued for earlier epochs.
    CancelPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Intent,
    Payment,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Intent => f.write_str("intent"),
            Failure::Payment => f.write_str("payment"),
        }
    }
}

/// Read-only view handed to display surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSnapshot {
    pub epoch: u64,
    pub step: Step,
    pub loading: bool,
    pub mode: PurchaseMode,
    pub product: Option<Product>,
    pub alternatives: Vec<Product>,
    pub receipt: Option<Receipt>,
    pub failure: Option<Failure>,
    pub logs: Vec<LogEntry>,
    /// Entries admitted to the stream but not revealed yet.
    pub pending_logs: usize,
}

#[derive(Debug)]
struct HeldProducts {
    product: Product,
    alternatives: Vec<Product>,
    logs: Vec<AgentLog>,
}

#[derive(Debug)]
struct HeldReceipt {
    receipt_id: String,
    logs: Vec<AgentLog>,
}

/// The scripted intent-to-payment flow as a state machine.
///
/// `handle` consumes one [`Event`] and returns the [`Effect`]s it implies. The timeline
/// never sleeps or performs I/O; the orchestrator owns clocks and calls and feeds their
/// outcomes back tagged with the [`epoch`](Timeline::epoch) they were issued for.
#[derive(Debug)]
pub struct Timeline {
    delays: Delays,
    auto_method: PaymentMethod,
    epoch: u64,
    step: Step,
    loading: bool,
    mode: PurchaseMode,
    product: Option<Product>,
    alternatives: Vec<Product>,
    receipt: Option<Receipt>,
    failure: Option<Failure>,
    charge: Option<Decimal>,
    /// Set while a scheduled auto-purchase may still fire.
    auto_armed: bool,
    held_products: Option<HeldProducts>,
    held_receipt: Option<HeldReceipt>,
    logs: LogStream,
}

impl Timeline {
    /// Creates an idle timeline using the delays and auto-payment method of `config`.
    pub fn new(config: &Config) -> Self {
        Self {
            delays: config.delays,
            auto_method: PaymentMethod::new(config.auto_payment_method.clone()),
            epoch: 0,
            step: Step::Idle,
            loading: false,
            mode: PurchaseMode::Manual,
            product: None,
            alternatives: Vec::new(),
            receipt: None,
            failure: None,
            charge: None,
            auto_armed: false,
            held_products: None,
            held_receipt: None,
            logs: LogStream::new(config.delays.log_stagger()),
        }
    }

    /// Applies `event` and returns the effects the driver must carry out.
    ///
    /// Events that do not fit the current state are ignored and yield no effects.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Submit { prompt, mode } => self.submit(&prompt, mode),
            Event::IntentCompleted(Ok(response)) => self.intent_resolved(response),
            Event::IntentCompleted(Err(e)) => {
                warn!(error = %e, "intent failed, aborting run");
                self.abort_intent(Vec::new())
            }
            Event::SelectProduct(product) => self.select_product(product),
            Event::Proceed => self.proceed(),
            Event::Pay { method } => self.pay(method),
            Event::PaymentCompleted(Ok(response)) => self.payment_resolved(response),
            Event::PaymentCompleted(Err(e)) => {
                warn!(error = %e, "payment failed");
                self.payment_failed(Vec::new(), "Payment could not be completed.")
            }
            Event::TimerElapsed(timer) => self.timer_elapsed(timer),
            Event::Restart => self.restart(),
        }
    }

    /// Current run; bumped by every submit and restart.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Highest step reached in the current run.
    pub fn step(&self) -> Step {
        self.step
    }

    /// Whether an intent or payment is awaiting its reveal.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn mode(&self) -> PurchaseMode {
        self.mode
    }

    /// Product that a payment would charge for.
    pub fn product(&self) -> Option<&Product> {
        self.product.as_ref()
    }

    pub fn alternatives(&self) -> &[Product] {
        &self.alternatives
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    pub fn failure(&self) -> Option<Failure> {
        self.failure
    }

    /// Revealed log entries, oldest first.
    pub fn logs(&self) -> &[LogEntry] {
        self.logs.visible()
    }

    /// Copies the observable state for display surfaces.
    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            epoch: self.epoch,
            step: self.step,
            loading: self.loading,
            mode: self.mode,
            product: self.product.clone(),
            alternatives: self.alternatives.clone(),
            receipt: self.receipt.clone(),
            failure: self.failure,
            logs: self.logs.visible().to_vec(),
            pending_logs: self.logs.pending_len(),
        }
    }

    fn submit(&mut self, prompt: &str, mode: PurchaseMode) -> Vec<Effect> {
        let prompt = prompt.trim();
        if prompt.is_empty() || self.loading || self.step != Step::Idle {
            debug!(step = %self.step, loading = self.loading, "submit ignored");
            return Vec::new();
        }

        let mut effects = self.reset();
        self.mode = mode;
        self.loading = true;
        self.step = Step::Shopping;
        info!(prompt, auto = mode.is_auto(), "intent submitted");
        effects.push(Effect::SendIntent(prompt.to_string()));
        effects
    }

    fn intent_resolved(&mut self, response: IntentResponse) -> Vec<Effect> {
        if !self.loading || self.step != Step::Shopping || self.held_products.is_some() {
            debug!("unexpected intent response ignored");
            return Vec::new();
        }

        let IntentResponse {
            product,
            alternatives,
            agent_logs,
        } = response;

        let Some(product) = product else {
            info!("no matching product, aborting run");
            let mut logs = agent_logs;
            logs.push(AgentLog::new(
                Agent::Shopping,
                "No matching product found. Try a different request.",
            ));
            return self.abort_intent(logs);
        };

        let (early, rest) = split_early(agent_logs);
        let alternatives = match alternatives {
            Some(list) if !list.is_empty() => list,
            _ => vec![product.clone()],
        };
        self.held_products = Some(HeldProducts {
            product,
            alternatives,
            logs: rest,
        });

        let mut effects = self.stream(early);
        effects.push(Effect::Schedule {
            after: self.delays.merchant_handoff(),
            timer: Timer::MerchantHandoff,
        });
        effects.push(Effect::Schedule {
            after: self.delays.product_reveal(),
            timer: Timer::RevealProducts,
        });
        effects
    }

    fn abort_intent(&mut self, logs: Vec<AgentLog>) -> Vec<Effect> {
        self.loading = false;
        self.step = Step::Idle;
        self.failure = Some(Failure::Intent);
        self.stream(logs)
    }

    fn reveal_products(&mut self) -> Vec<Effect> {
        let Some(held) = self.held_products.take() else {
            return Vec::new();
        };

        self.step.advance_to(Step::Merchant);
        let mut effects = self.stream(held.logs);
        let price = held.product.price;
        info!(product = %held.product.name, %price, matches = held.alternatives.len(), "products revealed");
        self.product = Some(held.product);
        self.alternatives = held.alternatives;
        self.loading = false;

        if let PurchaseMode::Auto { budget } = self.mode {
            if price <= budget {
                info!(%price, %budget, "auto-purchase scheduled");
                self.auto_armed = true;
                effects.push(Effect::Schedule {
                    after: self.delays.auto_payment(),
                    timer: Timer::AutoPay { amount: price },
                });
            } else {
                info!(%price, %budget, "price exceeds budget, falling back to manual approval");
                self.mode = PurchaseMode::Manual;
                effects.extend(self.stream(vec![AgentLog::new(
                    Agent::Shopping,
                    format!(
                        "⚠️ Auto-purchase halted: Price (₹{price}) exceeds limit (₹{budget}). Waiting for user approval."
                    ),
                )]));
            }
        }
        effects
    }

    fn select_product(&mut self, product: Product) -> Vec<Effect> {
        let offered = self.alternatives.iter().any(|p| p.name == product.name);
        if self.product.is_none()
            || !offered
            || self.loading
            || self.receipt.is_some()
            || self.step >= Step::Credentials
        {
            debug!(product = %product.name, "product selection ignored");
            return Vec::new();
        }

        self.product = Some(product.clone());
        vec![Effect::UpdateProduct(product)]
    }

    fn proceed(&mut self) -> Vec<Effect> {
        if self.mode.is_auto() || self.product.is_none() || self.loading {
            debug!("proceed ignored");
            return Vec::new();
        }
        self.step.advance_to(Step::Credentials);
        Vec::new()
    }

    fn pay(&mut self, method: PaymentMethod) -> Vec<Effect> {
        let Some(amount) = self.product.as_ref().map(|p| p.price) else {
            debug!("pay ignored, no product selected");
            return Vec::new();
        };
        if self.loading || self.receipt.is_some() {
            debug!("pay ignored");
            return Vec::new();
        }
        if self.mode.is_auto() && !method.is_auto_eligible() {
            debug!(%method, "method not allowed for auto-purchase");
            return Vec::new();
        }
        self.begin_payment(method, amount)
    }

    fn auto_pay(&mut self, amount: Decimal) -> Vec<Effect> {
        if !self.auto_armed || self.product.is_none() || self.loading || self.receipt.is_some() {
            debug!(armed = self.auto_armed, "auto-payment skipped");
            return Vec::new();
        }
        if !self.auto_method.is_auto_eligible() {
            warn!(method = %self.auto_method, "configured method not allowed for auto-purchase");
            self.auto_armed = false;
            return Vec::new();
        }
        self.begin_payment(self.auto_method.clone(), amount)
    }

    /// Any payment attempt, automatic or not, consumes the pending auto-purchase.
    fn begin_payment(&mut self, method: PaymentMethod, amount: Decimal) -> Vec<Effect> {
        self.auto_armed = false;
        self.loading = true;
        self.failure = None;
        self.charge = Some(amount);
        self.step.advance_to(Step::Credentials);
        vec![Effect::ProcessPayment { method, amount }]
    }

    fn payment_resolved(&mut self, response: PaymentResponse) -> Vec<Effect> {
        if !self.loading || self.charge.is_none() || self.held_receipt.is_some() {
            debug!("unexpected payment response ignored");
            return Vec::new();
        }

        let success = response.is_success();
        let PaymentResponse {
            status,
            receipt_id,
            agent_logs,
        } = response;

        let receipt_id = match receipt_id {
            Some(id) if success => id,
            _ => {
                warn!(%status, "payment declined");
                return self.payment_failed(agent_logs, &format!("Payment {status}."));
            }
        };

        let (early, rest) = split_early(agent_logs);
        self.held_receipt = Some(HeldReceipt {
            receipt_id,
            logs: rest,
        });

        let mut effects = self.stream(early);
        effects.push(Effect::Schedule {
            after: self.delays.payment_handoff(),
            timer: Timer::PaymentHandoff,
        });
        effects.push(Effect::Schedule {
            after: self.delays.receipt_reveal(),
            timer: Timer::RevealReceipt,
        });
        effects
    }

    /// Leaves product and step in place so the user can pick a method again.
    fn payment_failed(&mut self, mut logs: Vec<AgentLog>, reason: &str) -> Vec<Effect> {
        self.loading = false;
        self.charge = None;
        self.failure = Some(Failure::Payment);
        logs.push(AgentLog::new(
            Agent::Payment,
            format!("{reason} Choose a payment method to retry."),
        ));
        self.stream(logs)
    }

    fn reveal_receipt(&mut self) -> Vec<Effect> {
        let Some(held) = self.held_receipt.take() else {
            return Vec::new();
        };

        self.step.advance_to(Step::Payment);
        let effects = self.stream(held.logs);
        let receipt = Receipt {
            receipt_id: held.receipt_id,
            amount: self.charge.take().unwrap_or_default(),
        };
        info!(receipt = %receipt.receipt_id, amount = %receipt.amount, "payment complete");
        self.receipt = Some(receipt);
        self.loading = false;
        effects
    }

    fn timer_elapsed(&mut self, timer: Timer) -> Vec<Effect> {
        match timer {
            Timer::MerchantHandoff => {
                if self.step != Step::Idle {
                    self.step.advance_to(Step::Merchant);
                }
                Vec::new()
            }
            Timer::RevealProducts => self.reveal_products(),
            Timer::AutoPay { amount } => self.auto_pay(amount),
            Timer::PaymentHandoff => {
                if self.step >= Step::Credentials {
                    self.step.advance_to(Step::Payment);
                }
                Vec::new()
            }
            Timer::RevealReceipt => self.reveal_receipt(),
            Timer::RevealLog(id) => {
                self.logs.reveal(id);
                Vec::new()
            }
        }
    }

    fn restart(&mut self) -> Vec<Effect> {
        info!("timeline restarted");
        self.reset()
    }

    /// Returns to the initial state and opens a new epoch.
    fn reset(&mut self) -> Vec<Effect> {
        self.epoch += 1;
        self.step = Step::Idle;
        self.loading = false;
        self.mode = PurchaseMode::Manual;
        self.product = None;
        self.alternatives.clear();
        self.receipt = None;
        self.failure = None;
        self.charge = None;
        self.auto_armed = false;
        self.held_products = None;
        self.held_receipt = None;
        self.logs.clear();
        vec![Effect::CancelPending]
    }

    fn stream(&mut self, batch: Vec<AgentLog>) -> Vec<Effect> {
        self.logs
            .submit(batch)
            .into_iter()
            .map(|(after, id)| Effect::Schedule {
                after,
                timer: Timer::RevealLog(id),
            })
            .collect()
    }
}

fn split_early(mut logs: Vec<AgentLog>) -> (Vec<AgentLog>, Vec<AgentLog>) {
    let rest = if logs.len() > EARLY_LOGS {
        logs.split_off(EARLY_LOGS)
    } else {
        Vec::new()
    };
    (logs, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimelineError;
    use rust_decimal_macros::dec;

    /// Drives a timeline against a virtual clock, collecting non-timer effects.
    struct Sim {
        timeline: Timeline,
        now: Duration,
        seq: u64,
        queue: Vec<(Duration, u64, Timer)>,
        calls: Vec<Effect>,
    }

    impl Sim {
        fn new() -> Self {
            Self::with_config(Config::default())
        }

        fn with_config(config: Config) -> Self {
            Self {
                timeline: Timeline::new(&config),
                now: Duration::ZERO,
                seq: 0,
                queue: Vec::new(),
                calls: Vec::new(),
            }
        }

        fn apply(&mut self, event: Event) {
            for effect in self.timeline.handle(event) {
                match effect {
                    Effect::Schedule { after, timer } => {
                        self.seq += 1;
                        self.queue.push((self.now + after, self.seq, timer));
                    }
                    Effect::CancelPending => self.queue.clear(),
                    other => self.calls.push(other),
                }
            }
        }

        fn advance_ms(&mut self, ms: u64) {
            let until = self.now + Duration::from_millis(ms);
            while let Some(index) = self
                .queue
                .iter()
                .enumerate()
                .filter(|(_, (at, _, _))| *at <= until)
                .min_by_key(|(_, (at, seq, _))| (*at, *seq))
                .map(|(i, _)| i)
            {
                let (at, _, timer) = self.queue.remove(index);
                self.now = at;
                self.apply(Event::TimerElapsed(timer));
            }
            self.now = until;
        }

        fn messages(&self) -> Vec<String> {
            self.timeline
                .logs()
                .iter()
                .map(|e| e.message().to_string())
                .collect()
        }

        fn payments(&self) -> Vec<(String, Decimal)> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Effect::ProcessPayment { method, amount } => {
                        Some((method.id().to_string(), *amount))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn logs(agent: Agent, messages: &[&str]) -> Vec<AgentLog> {
        messages.iter().map(|m| AgentLog::new(agent.clone(), *m)).collect()
    }

    fn intent(price: Decimal) -> IntentResponse {
        IntentResponse {
            product: Some(Product::new("Espresso Maker", price)),
            alternatives: Some(vec![
                Product::new("Espresso Maker", price),
                Product::new("Espresso Maker Pro", price + dec!(2000)),
            ]),
            agent_logs: logs(Agent::Shopping, &["s1", "s2", "m1", "m2"]),
        }
    }

    fn payment_ok() -> PaymentResponse {
        PaymentResponse {
            status: "SUCCESS".to_string(),
            receipt_id: Some("txn_pay_42".to_string()),
            agent_logs: logs(Agent::Credentials, &["c1", "c2", "p1"]),
        }
    }

    fn submit(sim: &mut Sim, mode: PurchaseMode) {
        sim.apply(Event::Submit {
            prompt: "coffee machine".to_string(),
            mode,
        });
    }

    #[test]
    fn test_manual_run_progression() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);

        assert_eq!(sim.timeline.step(), Step::Shopping);
        assert!(sim.timeline.is_loading());
        assert_eq!(
            sim.calls,
            vec![Effect::SendIntent("coffee machine".to_string())]
        );

        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(999);
        assert_eq!(sim.timeline.step(), Step::Shopping);
        sim.advance_ms(1);
        assert_eq!(sim.timeline.step(), Step::Merchant);
        assert!(sim.timeline.product().is_none());

        sim.advance_ms(1500);
        assert_eq!(sim.timeline.product().unwrap().price, dec!(4999));
        assert_eq!(sim.timeline.alternatives().len(), 2);
        assert!(!sim.timeline.is_loading());

        sim.advance_ms(60_000);
        assert!(sim.payments().is_empty());
        assert_eq!(sim.timeline.step(), Step::Merchant);
    }

    #[test]
    fn test_step_never_decreases_during_run() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));

        let mut last = sim.timeline.step();
        let mut responded = false;
        for _ in 0..100 {
            sim.advance_ms(100);
            if !responded && !sim.payments().is_empty() {
                sim.apply(Event::PaymentCompleted(Ok(payment_ok())));
                responded = true;
            }
            let step = sim.timeline.step();
            assert!(step >= last, "step went from {last} to {step}");
            last = step;
        }
        assert_eq!(sim.timeline.step(), Step::Payment);
        assert!(sim.timeline.receipt().is_some());
    }

    #[test]
    fn test_auto_purchase_within_budget_pays_captured_price() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);
        assert!(sim.payments().is_empty());

        // Switching the product after the decision must not change the charged amount.
        let other = Product::new("Espresso Maker Pro", dec!(6999));
        sim.apply(Event::SelectProduct(other.clone()));
        assert!(sim.calls.contains(&Effect::UpdateProduct(other)));

        sim.advance_ms(2000);
        assert_eq!(sim.payments(), vec![("card_1".to_string(), dec!(4999))]);
        assert_eq!(sim.timeline.step(), Step::Credentials);

        sim.apply(Event::PaymentCompleted(Ok(payment_ok())));
        sim.advance_ms(1500);
        assert_eq!(sim.timeline.step(), Step::Payment);
        assert!(sim.timeline.receipt().is_none());

        sim.advance_ms(2000);
        let receipt = sim.timeline.receipt().unwrap();
        assert_eq!(receipt.receipt_id, "txn_pay_42");
        assert_eq!(receipt.amount, dec!(4999));
        assert!(!sim.timeline.is_loading());
    }

    #[test]
    fn test_budget_is_inclusive() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(4999) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(4500);
        assert_eq!(sim.payments().len(), 1);
    }

    #[test]
    fn test_failed_manual_pay_disarms_auto_purchase() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        sim.apply(Event::PaymentCompleted(Err(TimelineError::unreachable(
            "/pay",
            "connection refused",
        ))));
        sim.advance_ms(2000);

        assert_eq!(sim.payments(), vec![("card_1".to_string(), dec!(4999))]);
        assert_eq!(sim.timeline.failure(), Some(Failure::Payment));
        assert!(!sim.timeline.is_loading());
    }

    #[test]
    fn test_manual_pay_during_auto_window_charges_once() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        sim.apply(Event::PaymentCompleted(Ok(payment_ok())));
        sim.advance_ms(4000);

        assert_eq!(sim.payments().len(), 1);
        assert_eq!(sim.timeline.receipt().unwrap().amount, dec!(4999));
    }

    #[test]
    fn test_rejected_selection_keeps_auto_purchase() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::SelectProduct(Product::new("Toaster", dec!(10))));
        sim.advance_ms(2000);

        assert_eq!(sim.payments(), vec![("card_1".to_string(), dec!(4999))]);
        assert_eq!(sim.timeline.product().unwrap().name, "Espresso Maker");
    }

    #[test]
    fn test_restart_during_auto_window_drops_purchase() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::Restart);
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(7999)))));
        sim.advance_ms(2500);

        // A timer from the abandoned run that slipped past cancellation.
        sim.apply(Event::TimerElapsed(Timer::AutoPay { amount: dec!(4999) }));
        sim.advance_ms(10_000);

        assert!(sim.payments().is_empty());
        assert_eq!(sim.timeline.mode(), PurchaseMode::Manual);
        assert_eq!(sim.timeline.product().unwrap().price, dec!(7999));
    }

    #[test]
    fn test_ineligible_auto_method_never_pays() {
        let config = Config {
            auto_payment_method: "upi_1".to_string(),
            ..Config::default()
        };
        let mut sim = Sim::with_config(config);
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(10_000);

        assert!(sim.payments().is_empty());
        assert!(!sim.timeline.is_loading());
    }

    #[test]
    fn test_over_budget_falls_back_to_manual() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(1000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(60_000);

        assert!(sim.payments().is_empty());
        assert_eq!(sim.timeline.mode(), PurchaseMode::Manual);
        assert!(sim.messages().iter().any(|m| m
            == "⚠️ Auto-purchase halted: Price (₹4999) exceeds limit (₹1000). Waiting for user approval."));
    }

    #[test]
    fn test_logs_streamed_in_order() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));

        sim.advance_ms(0);
        assert_eq!(sim.messages(), vec!["s1"]);
        sim.advance_ms(600);
        assert_eq!(sim.messages(), vec!["s1", "s2"]);

        sim.advance_ms(10_000);
        assert_eq!(sim.messages(), vec!["s1", "s2", "m1", "m2"]);
    }

    #[test]
    fn test_restart_cancels_pending_reveals() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(0);
        assert_eq!(sim.messages().len(), 1);

        sim.apply(Event::Restart);
        sim.advance_ms(60_000);

        assert!(sim.messages().is_empty());
        assert!(sim.timeline.product().is_none());
        assert_eq!(sim.timeline.step(), Step::Idle);
    }

    #[test]
    fn test_stale_reveal_after_restart_is_noop() {
        let mut timeline = Timeline::new(&Config::default());
        timeline.handle(Event::Submit {
            prompt: "coffee machine".to_string(),
            mode: PurchaseMode::Manual,
        });
        let effects = timeline.handle(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        timeline.handle(Event::Restart);

        // Deliver every timer of the cancelled run anyway.
        for effect in effects {
            if let Effect::Schedule { timer, .. } = effect {
                assert!(timeline.handle(Event::TimerElapsed(timer)).is_empty());
            }
        }
        assert!(timeline.logs().is_empty());
        assert!(timeline.product().is_none());
        assert_eq!(timeline.step(), Step::Idle);
    }

    #[test]
    fn test_restart_resets_everything() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(4500);
        sim.apply(Event::PaymentCompleted(Ok(payment_ok())));
        sim.advance_ms(10_000);
        assert!(sim.timeline.receipt().is_some());

        let epoch = sim.timeline.epoch();
        sim.apply(Event::Restart);
        let snapshot = sim.timeline.snapshot();
        assert_eq!(snapshot.step, Step::Idle);
        assert!(snapshot.product.is_none());
        assert!(snapshot.alternatives.is_empty());
        assert!(snapshot.receipt.is_none());
        assert!(snapshot.logs.is_empty());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.epoch, epoch + 1);
    }

    #[test]
    fn test_submit_guards() {
        let mut sim = Sim::new();
        sim.apply(Event::Submit {
            prompt: "   ".to_string(),
            mode: PurchaseMode::Manual,
        });
        assert_eq!(sim.timeline.step(), Step::Idle);
        assert!(sim.calls.is_empty());

        submit(&mut sim, PurchaseMode::Manual);
        submit(&mut sim, PurchaseMode::Manual);
        assert_eq!(sim.calls.len(), 1);
    }

    #[test]
    fn test_intent_failure_aborts_to_idle() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Err(TimelineError::unreachable(
            "/intent",
            "HTTP 500",
        ))));

        assert_eq!(sim.timeline.step(), Step::Idle);
        assert!(!sim.timeline.is_loading());
        assert_eq!(sim.timeline.failure(), Some(Failure::Intent));

        // A new run may start right away.
        submit(&mut sim, PurchaseMode::Manual);
        assert_eq!(sim.timeline.step(), Step::Shopping);
        assert_eq!(sim.timeline.failure(), None);
    }

    #[test]
    fn test_intent_without_product_aborts() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(IntentResponse {
            product: None,
            alternatives: Some(Vec::new()),
            agent_logs: logs(Agent::Merchant, &["No product found for query"]),
        })));
        sim.advance_ms(10_000);

        assert_eq!(sim.timeline.step(), Step::Idle);
        assert_eq!(sim.timeline.failure(), Some(Failure::Intent));
        assert_eq!(sim.messages().len(), 2);
    }

    #[test]
    fn test_missing_alternatives_default_to_product() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        let mut response = intent(dec!(4999));
        response.alternatives = None;
        sim.apply(Event::IntentCompleted(Ok(response)));
        sim.advance_ms(2500);

        assert_eq!(sim.timeline.alternatives().len(), 1);
        assert_eq!(sim.timeline.alternatives()[0].name, "Espresso Maker");
    }

    #[test]
    fn test_manual_payment_flow() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        let pro = sim.timeline.alternatives()[1].clone();
        sim.apply(Event::SelectProduct(pro.clone()));
        assert_eq!(sim.timeline.product(), Some(&pro));
        sim.advance_ms(1000);

        sim.apply(Event::Proceed);
        assert_eq!(sim.timeline.step(), Step::Credentials);

        sim.apply(Event::Pay {
            method: PaymentMethod::new("upi_1"),
        });
        assert_eq!(sim.payments(), vec![("upi_1".to_string(), dec!(6999))]);

        sim.apply(Event::PaymentCompleted(Ok(payment_ok())));
        sim.advance_ms(3500);
        assert_eq!(sim.timeline.receipt().unwrap().amount, dec!(6999));
        assert_eq!(sim.messages(), vec!["s1", "s2", "m1", "m2", "c1", "c2", "p1"]);
    }

    #[test]
    fn test_unknown_product_selection_ignored() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::SelectProduct(Product::new("Toaster", dec!(10))));
        assert_eq!(sim.timeline.product().unwrap().name, "Espresso Maker");
        assert!(!sim.calls.iter().any(|c| matches!(c, Effect::UpdateProduct(_))));
    }

    #[test]
    fn test_auto_mode_rejects_upi() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Auto { budget: dec!(100000) });
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);

        sim.apply(Event::Pay {
            method: PaymentMethod::new("upi_1"),
        });
        assert!(sim.payments().is_empty());
    }

    #[test]
    fn test_payment_failure_allows_retry() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);
        sim.apply(Event::Proceed);
        sim.apply(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        sim.apply(Event::PaymentCompleted(Err(TimelineError::unreachable(
            "/pay",
            "connection refused",
        ))));

        assert!(!sim.timeline.is_loading());
        assert_eq!(sim.timeline.step(), Step::Credentials);
        assert!(sim.timeline.product().is_some());
        assert_eq!(sim.timeline.failure(), Some(Failure::Payment));

        sim.apply(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        assert_eq!(sim.payments().len(), 2);
        assert_eq!(sim.timeline.failure(), None);
    }

    #[test]
    fn test_declined_payment_has_no_receipt() {
        let mut sim = Sim::new();
        submit(&mut sim, PurchaseMode::Manual);
        sim.apply(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        sim.advance_ms(2500);
        sim.apply(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        sim.apply(Event::PaymentCompleted(Ok(PaymentResponse {
            status: "FAILED".to_string(),
            receipt_id: None,
            agent_logs: Vec::new(),
        })));
        sim.advance_ms(10_000);

        assert!(sim.timeline.receipt().is_none());
        assert_eq!(sim.timeline.failure(), Some(Failure::Payment));
        assert!(
            sim.messages()
                .iter()
                .any(|m| m.starts_with("Payment FAILED."))
        );
    }

    #[test]
    fn test_receipt_implies_terminal_step_with_zero_delays() {
        let mut config = Config::default();
        config.delays = Delays::immediate();
        let mut timeline = Timeline::new(&config);
        timeline.handle(Event::Submit {
            prompt: "coffee machine".to_string(),
            mode: PurchaseMode::Manual,
        });
        timeline.handle(Event::IntentCompleted(Ok(intent(dec!(4999)))));
        timeline.handle(Event::TimerElapsed(Timer::RevealProducts));
        assert_eq!(timeline.step(), Step::Merchant);

        timeline.handle(Event::Pay {
            method: PaymentMethod::new("card_1"),
        });
        timeline.handle(Event::PaymentCompleted(Ok(payment_ok())));
        // Receipt timer wins the race against the handoff timer.
        timeline.handle(Event::TimerElapsed(Timer::RevealReceipt));
        assert!(timeline.receipt().is_some());
        assert_eq!(timeline.step(), Step::Payment);
    }
}
