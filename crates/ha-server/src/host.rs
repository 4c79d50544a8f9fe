//! In-process automation host: bus, state store and services

use ha_apps::{HouseState, PresenceState};
use ha_config::AppsConfig;
use ha_core::{Context, EntityId, ServiceCall, STATE_OFF, STATE_ON, STATE_UNKNOWN};
use ha_event_bus::EventBus;
use ha_service_registry::{ServiceDescription, ServiceError, ServiceRegistry, ServiceResult};
use ha_state_store::{StateStore, ATTR_OPTIONS};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// The host services the apps run against
pub struct Host {
    pub bus: Arc<EventBus>,
    pub states: Arc<StateStore>,
    pub services: Arc<ServiceRegistry>,
}

impl Host {
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        let states = Arc::new(StateStore::new(bus.clone()));
        let services = Arc::new(ServiceRegistry::new());

        Self {
            bus,
            states,
            services,
        }
    }

    /// Create the input_selects and mode switches the apps write to
    pub fn seed_entities(&self, config: &AppsConfig) -> usize {
        let person_options: Vec<&str> = PresenceState::ALL.iter().map(|s| s.as_str()).collect();
        let house_options: Vec<&str> = HouseState::ALL.iter().map(|s| s.as_str()).collect();

        let mut count = 0;
        for person in config.persons.values() {
            self.seed_select(&person.presence_state, &person_options);
            count += 1;
        }
        self.seed_select(&config.house.presence_state, &house_options);
        count += 1;

        for entity_id in config.modes.values() {
            if !self.states.exists(&entity_id.to_string()) {
                self.states
                    .set(entity_id.clone(), STATE_OFF, HashMap::new(), Context::new());
                debug!("Loaded {} = {}", entity_id, STATE_OFF);
                count += 1;
            }
        }

        info!("Seeded {} entities", count);
        count
    }

    fn seed_select(&self, entity_id: &EntityId, options: &[&str]) {
        let mut attributes = HashMap::new();
        attributes.insert(ATTR_OPTIONS.to_string(), json!(options));
        self.states
            .set(entity_id.clone(), STATE_UNKNOWN, attributes, Context::new());
        debug!("Loaded {} with {} options", entity_id, options.len());
    }

    /// Register notify channels, MQTT publishing and the input helper services
    pub fn register_services(&self, config: &AppsConfig) {
        let channels: BTreeSet<&EntityId> = config
            .persons
            .values()
            .filter_map(|p| p.notifier.as_ref())
            .chain(config.house.notifier.as_ref())
            .collect();
        for channel in channels {
            register_notifier(&self.services, channel);
        }

        self.services.register_with_description(
            ServiceDescription::new("mqtt", "publish")
                .describe("Publish a message to an MQTT topic")
                .require("topic"),
            |call: ServiceCall| async move {
                let topic = call.get::<String>("topic").unwrap_or_default();
                let payload = call.get::<String>("payload").unwrap_or_default();
                info!(%topic, %payload, "MQTT publish");
                Ok(None)
            },
        );

        register_input_boolean_services(&self.services, self.states.clone());
        register_input_select_services(&self.services, self.states.clone());
        info!("{} services registered", self.services.service_count());
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

/// Channels log what they would deliver
fn register_notifier(services: &ServiceRegistry, channel: &EntityId) {
    let name = channel.object_id().to_string();
    services.register_with_description(
        ServiceDescription::new("notify", channel.object_id())
            .describe("Send a notification")
            .require("message"),
        move |call: ServiceCall| {
            let name = name.clone();
            async move {
                let title = call.get::<String>("title").unwrap_or_default();
                let message = call.get::<String>("message").unwrap_or_default();
                info!(channel = %name, %title, %message, "Notification delivered");
                Ok(None)
            }
        },
    );
}

fn register_input_boolean_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    const DOMAIN: &str = "input_boolean";

    for service in ["turn_on", "turn_off", "toggle"] {
        let states = states.clone();
        services.register_with_description(
            ServiceDescription::new(DOMAIN, service).require("entity_id"),
            move |call: ServiceCall| {
                let states = states.clone();
                async move {
                    for entity_id in get_target_entities(&call, DOMAIN) {
                        let Some(current) = states.get(&entity_id.to_string()) else {
                            continue;
                        };
                        let new_state = match call.service.as_str() {
                            "turn_on" => STATE_ON,
                            "turn_off" => STATE_OFF,
                            _ if current.state == STATE_ON => STATE_OFF,
                            _ => STATE_ON,
                        };
                        states.set(entity_id, new_state, current.attributes, call.context.clone());
                    }
                    Ok(None)
                }
            },
        );
    }
}

fn register_input_select_services(services: &ServiceRegistry, states: Arc<StateStore>) {
    services.register_with_description(
        ServiceDescription::new("input_select", "select_option")
            .describe("Select an option of an input_select")
            .require("entity_id")
            .require("option"),
        move |call: ServiceCall| {
            let states = states.clone();
            async move { select_option(&states, &call) }
        },
    );
}

fn select_option(states: &StateStore, call: &ServiceCall) -> ServiceResult {
    let option = call
        .get::<String>("option")
        .ok_or_else(|| ServiceError::InvalidData("option must be a string".into()))?;
    for entity_id in get_target_entities(call, "input_select") {
        states
            .select_option(&entity_id, &option, call.context.clone())
            .map_err(|e| ServiceError::CallFailed(e.to_string()))?;
    }
    Ok(None)
}

/// Extract target entity ids of a domain from a service call
fn get_target_entities(call: &ServiceCall, domain: &str) -> Vec<EntityId> {
    let ids: Vec<&str> = match call.service_data.get("entity_id") {
        Some(serde_json::Value::String(id)) => vec![id.as_str()],
        Some(serde_json::Value::Array(ids)) => ids.iter().filter_map(|id| id.as_str()).collect(),
        _ => Vec::new(),
    };

    ids.into_iter()
        .filter_map(|id| id.parse::<EntityId>().ok())
        .filter(|e| e.in_domain(domain))
        .collect()
}
