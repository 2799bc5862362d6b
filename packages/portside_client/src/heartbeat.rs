//! Heartbeat decay indicator. Every server time tick resets a glyph to a
//! living heart; staged timers then fade it through cooler colors toward a
//! tombstone when the ticks stop arriving.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use portside_protocol::kind;

use crate::channel::{ChannelClient, ListenerHandle};
use crate::surface::PanelSurface;

/// Intermediate fade colors between alive and dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeColor {
    Purple,
    Blue,
    Black,
}

/// Decay stages of the indicator, ordered by silence duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayStage {
    Alive,
    Fading(FadeColor),
    Dead,
}

impl DecayStage {
    /// Glyph shown for this stage.
    pub fn glyph(self) -> &'static str {
        match self {
            DecayStage::Alive => "❤️",
            DecayStage::Fading(FadeColor::Purple) => "💜",
            DecayStage::Fading(FadeColor::Blue) => "💙",
            DecayStage::Fading(FadeColor::Black) => "🖤",
            DecayStage::Dead => "🪦",
        }
    }

    /// Silence duration after which this stage is entered. `Alive` has no
    /// offset: it is entered on the tick itself.
    pub fn offset(self) -> Option<Duration> {
        match self {
            DecayStage::Alive => None,
            DecayStage::Fading(FadeColor::Purple) => Some(Duration::from_millis(1100)),
            DecayStage::Fading(FadeColor::Blue) => Some(Duration::from_millis(2500)),
            DecayStage::Fading(FadeColor::Black) => Some(Duration::from_millis(4000)),
            DecayStage::Dead => Some(Duration::from_millis(5500)),
        }
    }

    const DECAYED: [DecayStage; 4] = [
        DecayStage::Fading(FadeColor::Purple),
        DecayStage::Fading(FadeColor::Blue),
        DecayStage::Fading(FadeColor::Black),
        DecayStage::Dead,
    ];
}

/// Drives a heart glyph on the panel from server time ticks.
pub struct HeartbeatIndicator<S> {
    surface: Arc<S>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: PanelSurface> HeartbeatIndicator<S> {
    pub fn new(surface: Arc<S>) -> Arc<Self> {
        Arc::new(Self {
            surface,
            timers: Mutex::new(Vec::new()),
        })
    }

    /// Register with the channel so every time tick beats the indicator.
    /// Dropping the returned handle keeps the listener; call its `remove`
    /// to detach.
    pub async fn attach(self: &Arc<Self>, channel: &ChannelClient) -> ListenerHandle {
        let indicator = Arc::clone(self);
        channel
            .add_message_listener(move |envelope| {
                let indicator = Arc::clone(&indicator);
                Box::pin(async move {
                    if envelope.kind == kind::TIME {
                        indicator.beat();
                    }
                })
            })
            .await
    }

    /// A tick arrived: restore the living glyph, pulse it, and restart the
    /// decay schedule from zero.
    pub fn beat(self: &Arc<Self>) {
        if !self.surface.heart_present() {
            return;
        }
        self.clear_timers();
        self.surface.set_heart_glyph(DecayStage::Alive.glyph());
        self.surface.pulse_heart();

        let mut timers = match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for stage in DecayStage::DECAYED {
            let surface = Arc::clone(&self.surface);
            let offset = match stage.offset() {
                Some(offset) => offset,
                None => continue,
            };
            timers.push(tokio::spawn(async move {
                tokio::time::sleep(offset).await;
                trace!(glyph = stage.glyph(), "heartbeat decay stage");
                surface.set_heart_glyph(stage.glyph());
            }));
        }
    }

    fn clear_timers(&self) {
        let mut timers = match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for timer in timers.drain(..) {
            timer.abort();
        }
    }
}

impl<S> Drop for HeartbeatIndicator<S> {
    fn drop(&mut self) {
        let mut timers = match self.timers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for timer in timers.drain(..) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PageModel;
    use tokio::time::{self, Duration};

    #[tokio::test(start_paused = true)]
    async fn decays_through_every_stage() {
        let page = Arc::new(PageModel::new());
        let indicator = HeartbeatIndicator::new(Arc::clone(&page));

        indicator.beat();
        assert_eq!(page.heart_glyph().as_deref(), Some("❤️"));
        assert_eq!(page.pulse_count(), 1);
        // Let the spawned decay timers register before the clock moves, and
        // let them fire after each advance.
        tokio::task::yield_now().await;

        time::advance(Duration::from_millis(1101)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("💜"));

        time::advance(Duration::from_millis(1400)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("💙"));

        time::advance(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("🖤"));

        time::advance(Duration::from_millis(1500)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("🪦"));
    }

    #[tokio::test(start_paused = true)]
    async fn beat_resets_the_schedule() {
        let page = Arc::new(PageModel::new());
        let indicator = HeartbeatIndicator::new(Arc::clone(&page));

        indicator.beat();
        tokio::task::yield_now().await;
        time::advance(Duration::from_millis(1000)).await;
        tokio::task::yield_now().await;

        // A second beat before the first fade lands restarts the clock.
        indicator.beat();
        assert_eq!(page.heart_glyph().as_deref(), Some("❤️"));
        tokio::task::yield_now().await;

        time::advance(Duration::from_millis(1000)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("❤️"));

        time::advance(Duration::from_millis(101)).await;
        tokio::task::yield_now().await;
        assert_eq!(page.heart_glyph().as_deref(), Some("💜"));
        assert_eq!(page.pulse_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn absent_heart_is_a_no_op() {
        let page = Arc::new(PageModel::bare());
        let indicator = HeartbeatIndicator::new(Arc::clone(&page));

        indicator.beat();
        time::advance(Duration::from_millis(6000)).await;
        assert!(page.heart_glyph().is_none());
        assert_eq!(page.pulse_count(), 0);
    }
}
