//! Serialized event loop driving the apps
//!
//! Bus events and fired timers arrive on channels and are handed to the
//! [`AppManager`] one at a time. Apps reach the host through [`HassAdapter`];
//! service calls they make are dispatched onto their own tasks so an app
//! callback never waits for a handler.

use crate::host::Host;
use chrono::{NaiveDateTime, NaiveTime};
use ha_apps::{AppManager, AppResult, AppTimer, Hass};
use ha_config::AppsConfig;
use ha_core::{Context, EntityId, Event, StateReading};
use ha_scheduler::{FiredTimer, Scheduler, TimerHandle};
use ha_service_registry::{ServiceError, ServiceRegistry};
use ha_state_store::StateStore;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Name the apps' writes are attributed to
const APP_CONTEXT: &str = "household_apps";

/// [`Hass`] over the in-process host
pub struct HassAdapter {
    states: Arc<StateStore>,
    services: Arc<ServiceRegistry>,
    scheduler: Scheduler<AppTimer>,
    context: Context,
}

impl HassAdapter {
    pub fn new(host: &Host, scheduler: Scheduler<AppTimer>) -> Self {
        Self {
            states: host.states.clone(),
            services: host.services.clone(),
            scheduler,
            context: Context::from_app(APP_CONTEXT),
        }
    }

    /// Whether a fired timer is still wanted
    pub fn claim(&self, fired: &FiredTimer<AppTimer>) -> bool {
        self.scheduler.claim(fired)
    }

    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }
}

impl Hass for HassAdapter {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn get_state(&self, entity_id: &EntityId) -> StateReading {
        self.states.read(&entity_id.to_string())
    }

    fn select_option(&self, entity_id: &EntityId, option: &str) -> AppResult<()> {
        self.states
            .select_option(entity_id, option, self.context.child())?;
        Ok(())
    }

    fn set_state(&self, entity_id: &EntityId, state: &str) -> AppResult<()> {
        self.states
            .set_value(entity_id.clone(), state, self.context.child());
        Ok(())
    }

    fn call_service(&self, domain: &str, service: &str, data: Value) -> AppResult<()> {
        if !self.services.has_service(domain, service) {
            return Err(ServiceError::NotFound {
                domain: domain.to_string(),
                service: service.to_string(),
            }
            .into());
        }

        let services = self.services.clone();
        let (domain, service) = (domain.to_string(), service.to_string());
        let context = self.context.child();
        tokio::spawn(async move {
            if let Err(err) = services.call(&domain, &service, data, context).await {
                error!(%domain, %service, %err, "Service call failed");
            }
        });
        Ok(())
    }

    fn run_in(&self, delay: Duration, timer: AppTimer) -> TimerHandle {
        self.scheduler.run_in(delay, timer)
    }

    fn run_every(&self, start: Duration, interval: Duration, timer: AppTimer) -> TimerHandle {
        self.scheduler.run_every(start, interval, timer)
    }

    fn run_daily(&self, at: NaiveTime, timer: AppTimer) -> TimerHandle {
        self.scheduler.run_daily(at, timer)
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.scheduler.cancel_timer(handle);
    }
}

/// The apps wired to the host
pub struct AppRuntime {
    manager: AppManager,
    hass: HassAdapter,
    events: broadcast::Receiver<Event<Value>>,
    timers: mpsc::UnboundedReceiver<FiredTimer<AppTimer>>,
}

impl AppRuntime {
    /// Subscribes to the bus immediately, so no event after this call is missed
    pub fn new(
        config: &AppsConfig,
        host: &Host,
        scheduler: Scheduler<AppTimer>,
        timers: mpsc::UnboundedReceiver<FiredTimer<AppTimer>>,
    ) -> Self {
        Self {
            manager: AppManager::new(config),
            hass: HassAdapter::new(host, scheduler),
            events: host.bus.subscribe_all(),
            timers,
        }
    }

    /// Initialize the apps and process callbacks until `shutdown` completes
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> AppResult<()> {
        let Self {
            mut manager,
            hass,
            mut events,
            mut timers,
        } = self;

        manager.initialize(&hass)?;
        info!("Apps running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(err) = manager.on_event(&hass, &event) {
                            error!(event_type = %event.event_type, %err, "Event handling failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Apps lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event bus closed, stopping apps");
                        break;
                    }
                },
                Some(fired) = timers.recv() => {
                    if !hass.claim(&fired) {
                        debug!(handle = %fired.handle, "Canceled timer discarded");
                        continue;
                    }
                    if let Err(err) = manager.on_timer(&hass, fired.payload) {
                        error!(handle = %fired.handle, %err, "Timer handling failed");
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        hass.shutdown();
        Ok(())
    }
}
