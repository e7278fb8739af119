//! Short-lived access pass shown to the gate scanner.
//!
//! A pass is a small JSON payload rendered as a QR code. It is valid for a
//! fixed number of seconds, tracked by a local countdown only: nothing on
//! the remote side knows about it or enforces the expiry.

use crate::error::{AccessError, Result};
use crate::model::Identity;
use base64::Engine;
use qrcode::render::{svg, unicode};
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const PAYLOAD_TYPE: &str = "ATTENDANCE_MARKER";
pub const DEFAULT_VALIDITY_SECS: u32 = 120;

/// The payload encoded into the QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    pub roll_no: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub api_endpoint: String,
}

/// Rendered forms of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPass {
    /// `data:image/svg+xml;base64,...`
    pub data_url: String,
    /// Block-character rendering for the terminal
    pub terminal: String,
}

/// Turns a payload string into a scannable image
pub trait PassEncoder: Send {
    fn encode(&self, payload: &str) -> anyhow::Result<EncodedPass>;
}

pub struct QrEncoder;

impl PassEncoder for QrEncoder {
    fn encode(&self, payload: &str) -> anyhow::Result<EncodedPass> {
        let code = QrCode::new(payload.as_bytes())?;
        let image = code
            .render::<svg::Color>()
            .min_dimensions(400, 400)
            .quiet_zone(true)
            .dark_color(svg::Color("#0f172a"))
            .light_color(svg::Color("#ffffff"))
            .build();
        let data_url = format!(
            "data:image/svg+xml;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let terminal = code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build();
        Ok(EncodedPass { data_url, terminal })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    /// No pass generated yet
    Idle,
    /// Pass displayed, countdown running
    Active,
    /// Pass still displayed but stale
    Expired,
}

#[derive(Debug)]
struct PassState {
    phase: PassPhase,
    remaining: u32,
    token: Option<AccessToken>,
    image: Option<EncodedPass>,
}

impl PassState {
    /// Advance one second. Returns true when this tick expired the pass.
    fn tick(&mut self) -> bool {
        if self.phase != PassPhase::Active {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.phase = PassPhase::Expired;
            return true;
        }
        false
    }
}

/// Handle to a periodic background task.
///
/// The task runs `on_tick` every `period` until it returns false or the
/// handle is cancelled. Dropping the handle cancels and joins the thread.
pub struct Countdown {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn start<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    if !on_tick() {
                        break;
                    }
                }
                // stop requested or handle dropped
                _ => break,
            }
        });
        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

/// Generates passes for the signed-in student and runs their countdown.
///
/// States go `Idle -> Active -> Expired`, and back to `Active` only through
/// another [`PassGenerator::generate`]. The countdown thread is owned by the
/// generator and stops when the generator is dropped.
pub struct PassGenerator {
    state: Arc<Mutex<PassState>>,
    countdown: Option<Countdown>,
    validity_secs: u32,
    /// `None` means ticks are driven by the caller through [`PassGenerator::tick`]
    period: Option<Duration>,
    endpoint: String,
    encoder: Box<dyn PassEncoder>,
    on_expire: Option<ExpiryHook>,
}

impl PassGenerator {
    pub fn new(endpoint: &str, validity_secs: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(PassState {
                phase: PassPhase::Idle,
                remaining: validity_secs,
                token: None,
                image: None,
            })),
            countdown: None,
            validity_secs,
            period: Some(Duration::from_secs(1)),
            endpoint: endpoint.to_string(),
            encoder: Box::new(QrEncoder),
            on_expire: None,
        }
    }

    #[cfg(test)]
    pub fn with_encoder(mut self, encoder: Box<dyn PassEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    #[cfg(test)]
    pub fn with_period(mut self, period: Option<Duration>) -> Self {
        self.period = period;
        self
    }

    /// Called once, from the countdown thread, when a pass expires
    pub fn on_expire(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_expire = Some(Arc::new(hook));
        self
    }

    /// Issue a new pass for `identity` and restart the countdown.
    ///
    /// Works from every phase; from `Expired` this is the only way back to
    /// `Active`.
    pub fn generate(&mut self, identity: Option<&Identity>) -> Result<AccessToken> {
        let Some(identity) = identity else {
            tracing::warn!("Cannot generate pass without a signed-in student");
            return Err(AccessError::State("Student data not found.".to_string()));
        };

        // stop the old ticker before touching state so it cannot tick the new pass
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }

        let previous = self.lock().token.as_ref().map(|t| t.timestamp);
        let now = chrono::Utc::now().timestamp_millis();
        let token = AccessToken {
            kind: PAYLOAD_TYPE.to_string(),
            student_id: identity.storage_key.clone(),
            roll_no: identity.roll_no.clone(),
            timestamp: previous.map_or(now, |prev| now.max(prev + 1)),
            api_endpoint: self.endpoint.clone(),
        };

        let payload = serde_json::to_string(&token)
            .map_err(|e| AccessError::State(format!("Failed to generate pass: {}", e)))?;
        let image = self.encoder.encode(&payload).map_err(|e| {
            tracing::error!("QR generation failed: {:#}", e);
            AccessError::State("Failed to generate pass.".to_string())
        })?;

        {
            let mut state = self.lock();
            state.phase = PassPhase::Active;
            state.remaining = self.validity_secs;
            state.token = Some(token.clone());
            state.image = Some(image);
        }
        tracing::info!(roll_no = %token.roll_no, timestamp = token.timestamp, "Pass generated");

        if let Some(period) = self.period {
            let state = Arc::clone(&self.state);
            let hook = self.on_expire.clone();
            self.countdown = Some(Countdown::start(period, move || {
                advance(&state, hook.as_ref())
            }));
        }
        Ok(token)
    }

    /// Advance the countdown by one second by hand
    #[cfg(test)]
    pub fn tick(&self) -> PassPhase {
        advance(&self.state, self.on_expire.as_ref());
        self.phase()
    }

    pub fn phase(&self) -> PassPhase {
        self.lock().phase
    }

    pub fn remaining(&self) -> u32 {
        self.lock().remaining
    }

    pub fn is_expired(&self) -> bool {
        self.phase() == PassPhase::Expired
    }

    pub fn formatted_remaining(&self) -> String {
        format_remaining(self.remaining())
    }

    pub fn token(&self) -> Option<AccessToken> {
        self.lock().token.clone()
    }

    /// The rendered pass; kept after expiry
    pub fn image(&self) -> Option<EncodedPass> {
        self.lock().image.clone()
    }

    /// Whether a countdown thread is currently alive
    pub fn is_ticking(&self) -> bool {
        self.countdown.as_ref().is_some_and(Countdown::is_running)
    }

    /// Stop the countdown and forget the pass
    pub fn reset(&mut self) {
        if let Some(mut countdown) = self.countdown.take() {
            countdown.cancel();
        }
        let mut state = self.lock();
        state.phase = PassPhase::Idle;
        state.remaining = self.validity_secs;
        state.token = None;
        state.image = None;
    }

    fn lock(&self) -> MutexGuard<'_, PassState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<PassState>) -> MutexGuard<'_, PassState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One tick on shared state. Returns whether the countdown should continue.
fn advance(state: &Mutex<PassState>, hook: Option<&ExpiryHook>) -> bool {
    let (expired, active) = {
        let mut state = lock_state(state);
        let expired = state.tick();
        (expired, state.phase == PassPhase::Active)
    };
    if expired {
        tracing::warn!("Access pass expired");
        if let Some(hook) = hook {
            hook();
        }
    }
    active
}

/// `MM:SS`
pub fn format_remaining(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
