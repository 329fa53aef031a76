//! Throughput, loss, and ETA reporting.

use crate::callbacks::is_due;
use crate::collaborators::LossScaler;
use crate::config::{LoggingConfig, RoleConfig};
use crate::error::CallbackError;
use crate::meter::LossAccumulator;
use crate::role::ProcessRole;
use crate::writer::MetricsWriter;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of monotonic time for interval measurements.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Statistics emitted by one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputReport {
    pub step: u64,
    pub epoch: usize,
    /// Samples per second across all processes.
    pub speed_total: f64,
    pub loss: f64,
    pub learning_rate: f64,
    /// Loss-scale factor, present only under reduced precision.
    pub grad_scale: Option<f64>,
    pub hours_remaining: f64,
    /// The exact line written to the log.
    pub message: String,
}

/// Samples per second summed over `world_size` processes for `frequent`
/// steps of `batch_size` taking `elapsed_secs`. Zero elapsed time yields
/// positive infinity.
pub fn samples_per_sec(frequent: u64, batch_size: usize, world_size: usize, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return f64::INFINITY;
    }
    let speed = frequent as f64 * batch_size as f64 / elapsed_secs;
    speed * world_size as f64
}

/// Linear extrapolation of the run length from the hours spent so far and
/// the completed fraction `(step + 1) / total_step`. Returns
/// `(total_hours, remaining_hours)`.
pub fn estimate_hours(elapsed_hours: f64, step: u64, total_step: u64) -> (f64, f64) {
    let done = step.saturating_add(1) as f64 / total_step as f64;
    let total = elapsed_hours / done;
    (total, total - elapsed_hours)
}

/// Emits a throughput/loss line every `frequent` steps on the coordinator.
///
/// The first due step only starts the measurement window; every later due
/// step reports on the window since the previous one and resets the loss
/// accumulator.
pub struct LoggingCallback {
    frequent: u64,
    role: ProcessRole,
    total_step: u64,
    batch_size: usize,
    world_size: usize,
    writer: Option<Box<dyn MetricsWriter>>,
    clock: Arc<dyn Clock>,
    time_start: Instant,
    tic: Option<Instant>,
}

impl LoggingCallback {
    pub fn new(
        frequent: u64,
        role: ProcessRole,
        total_step: u64,
        batch_size: usize,
        world_size: usize,
        writer: Option<Box<dyn MetricsWriter>>,
    ) -> Self {
        Self::with_clock(
            frequent,
            role,
            total_step,
            batch_size,
            world_size,
            writer,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        frequent: u64,
        role: ProcessRole,
        total_step: u64,
        batch_size: usize,
        world_size: usize,
        writer: Option<Box<dyn MetricsWriter>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let time_start = clock.now();
        Self {
            frequent,
            role,
            total_step,
            batch_size,
            world_size,
            writer,
            clock,
            time_start,
            tic: None,
        }
    }

    pub fn from_config(
        config: &LoggingConfig,
        role: &RoleConfig,
        writer: Option<Box<dyn MetricsWriter>>,
    ) -> Self {
        Self::new(
            config.frequent,
            role.role(),
            config.total_step,
            config.batch_size,
            role.world_size,
            writer,
        )
    }

    /// Whether the timing window has been started.
    pub fn is_armed(&self) -> bool {
        self.tic.is_some()
    }

    pub fn flush(&mut self) -> Result<(), CallbackError> {
        match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }

    pub fn report_if_due(
        &mut self,
        step: u64,
        loss: &mut dyn LossAccumulator,
        epoch: usize,
        fp16: bool,
        learning_rate: f64,
        grad_scaler: &dyn LossScaler,
    ) -> Result<Option<ThroughputReport>, CallbackError> {
        if !self.role.is_coordinator() || !is_due(step, self.frequent) {
            return Ok(None);
        }

        let now = self.clock.now();
        let Some(tic) = self.tic else {
            self.tic = Some(now);
            tracing::debug!(step, "Throughput window armed");
            return Ok(None);
        };

        let elapsed = now.saturating_duration_since(tic).as_secs_f64();
        let speed_total = samples_per_sec(self.frequent, self.batch_size, self.world_size, elapsed);

        let time_now = now.saturating_duration_since(self.time_start).as_secs_f64() / 3600.0;
        let (_, time_for_end) = estimate_hours(time_now, step, self.total_step);
        let mean_loss = loss.mean();

        if let Some(writer) = self.writer.as_mut() {
            writer.add_scalar("time_for_end", time_for_end, step)?;
            writer.add_scalar("learning_rate", learning_rate, step)?;
            writer.add_scalar("loss", mean_loss, step)?;
        }

        let grad_scale = fp16.then(|| grad_scaler.scale());
        let message = match grad_scale {
            Some(scale) => format!(
                "Speed {speed_total:.2} samples/sec   Loss {mean_loss:.4}   LearningRate {learning_rate:.6}   \
                 Epoch: {epoch}   Global Step: {step}   Fp16 Grad Scale: {scale:2.0}   \
                 Required: {time_for_end:1.0} hours"
            ),
            None => format!(
                "Speed {speed_total:.2} samples/sec   Loss {mean_loss:.4}   LearningRate {learning_rate:.4}   \
                 Epoch: {epoch}   Global Step: {step}   Required: {time_for_end:1.0} hours"
            ),
        };
        tracing::info!("{message}");

        loss.reset();
        self.tic = Some(self.clock.now());

        Ok(Some(ThroughputReport {
            step,
            epoch,
            speed_total,
            loss: mean_loss,
            learning_rate,
            grad_scale,
            hours_remaining: time_for_end,
            message,
        }))
    }
}

impl std::fmt::Debug for LoggingCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingCallback")
            .field("frequent", &self.frequent)
            .field("role", &self.role)
            .field("total_step", &self.total_step)
            .field("batch_size", &self.batch_size)
            .field("world_size", &self.world_size)
            .field("has_writer", &self.writer.is_some())
            .field("armed", &self.tic.is_some())
            .finish()
    }
}
