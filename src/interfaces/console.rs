use crate::application::orchestrator::TimelineHandle;
use crate::application::timeline::TimelineSnapshot;
use crate::domain::payment::{PaymentMethod, PurchaseMode, Receipt, payment_options};
use crate::domain::step::Step;
use crate::error::{Result, TimelineError};
use std::io::Write;

/// Renders successive snapshots as an append-only transcript.
///
/// Only what changed since the previous snapshot is written: the active step, newly
/// revealed log entries, the product list, payment options and the receipt.
pub struct ConsoleRenderer<W: Write> {
    out: W,
    epoch: u64,
    step: Step,
    shown_logs: usize,
    shown_product: Option<String>,
    options_shown: bool,
    receipt_shown: bool,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            epoch: 0,
            step: Step::Idle,
            shown_logs: 0,
            shown_product: None,
            options_shown: false,
            receipt_shown: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, snapshot: &TimelineSnapshot) -> Result<()> {
        if snapshot.epoch != self.epoch {
            self.epoch = snapshot.epoch;
            self.step = Step::Idle;
            self.shown_logs = 0;
            self.shown_product = None;
            self.options_shown = false;
            self.receipt_shown = false;
        }

        if snapshot.step != self.step {
            self.step = snapshot.step;
            writeln!(self.out, "== Step {}", snapshot.step)?;
        }

        for entry in snapshot.logs.iter().skip(self.shown_logs) {
            writeln!(self.out, "{entry}")?;
        }
        self.shown_logs = snapshot.logs.len();

        if let Some(product) = &snapshot.product
            && self.shown_product.as_deref() != Some(product.name.as_str())
        {
            writeln!(self.out, "Found {} matches:", snapshot.alternatives.len())?;
            for candidate in &snapshot.alternatives {
                let marker = if candidate.name == product.name { '*' } else { ' ' };
                write!(self.out, " {marker} {} - ₹{}", candidate.name, candidate.price)?;
                if let Some(brand) = &candidate.brand {
                    write!(self.out, " ({brand})")?;
                }
                writeln!(self.out)?;
            }
            self.shown_product = Some(product.name.clone());
        }

        if snapshot.step >= Step::Credentials && snapshot.receipt.is_none() && !self.options_shown {
            writeln!(self.out, "Payment options:")?;
            for option in payment_options(snapshot.mode) {
                writeln!(self.out, "   {} {} {}", option.id, option.label, option.detail)?;
            }
            self.options_shown = true;
        }

        if let Some(receipt) = &snapshot.receipt
            && !self.receipt_shown
        {
            writeln!(self.out, "{receipt}")?;
            self.receipt_shown = true;
        }

        self.out.flush()?;
        Ok(())
    }
}

/// Submits `prompt` and follows the run to its receipt, rendering along the way.
///
/// Plays the approving user: once products are shown in manual mode (including an
/// auto-purchase that fell back to manual) it proceeds and pays with `method`.
/// Returns once the receipt and all of its log entries are shown.
pub async fn drive_run<W: Write>(
    handle: &TimelineHandle,
    prompt: &str,
    mode: PurchaseMode,
    method: PaymentMethod,
    renderer: &mut ConsoleRenderer<W>,
) -> Result<Receipt> {
    let mut updates = handle.subscribe();
    handle.submit(prompt, mode).await?;
    let submitted = handle.snapshot().await?;
    if submitted.step == Step::Idle && submitted.failure.is_none() {
        return Err(TimelineError::Aborted {
            stage: "submit".to_string(),
        });
    }
    let epoch = submitted.epoch;
    let mut confirmed = false;

    loop {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.epoch == epoch {
            renderer.render(&snapshot)?;

            let settled = !snapshot.loading && snapshot.pending_logs == 0;
            if let Some(receipt) = snapshot.receipt.clone()
                && settled
            {
                return Ok(receipt);
            }
            if let Some(failure) = snapshot.failure
                && settled
            {
                return Err(TimelineError::Aborted {
                    stage: failure.to_string(),
                });
            }

            let awaiting_approval = snapshot.product.is_some()
                && !snapshot.loading
                && snapshot.receipt.is_none()
                && !snapshot.mode.is_auto();
            if awaiting_approval && !confirmed {
                confirmed = true;
                handle.proceed().await?;
                handle.pay(method.clone()).await?;
            }
        }

        updates
            .changed()
            .await
            .map_err(|_| TimelineError::Stopped)?;
    }
}
