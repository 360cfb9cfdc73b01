//! Easotope Test Utilities
//!
//! Centralized test infrastructure for the Easotope client workspace:
//! - An in-memory lab server and a [`TestLab`] harness driving it
//! - Proptest generators for the lab entity types
//! - Test fixtures for common scenarios
//! - Custom assertions for cache and dependency results

// Re-export the recording doubles from their source crates
pub use easotope_cache::RecordingListener;
pub use easotope_events::MockRemote;

// Re-export core types for convenience
pub use easotope_core::{
    AcidTemp, CacheConfig, ConstantTable, EasotopeError, EasotopeResult, EntityId, LabObject,
    MassSpec, PhysicalConstant, RefGas, RefGasList, RefGasSummary, Standard, Timestamp,
    NO_ENTITY,
};
pub use easotope_events::{Command, CommandKind, Completion, CorrelationId, Event, RemoteError};

use easotope_cache::LabCaches;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// IN-MEMORY LAB SERVER
// ============================================================================

/// Server-side tables answering the commands the lab plugins issue.
#[derive(Debug, Clone, Default)]
pub struct LabServer {
    pub mass_specs: BTreeMap<EntityId, MassSpec>,
    pub standards: BTreeMap<EntityId, Standard>,
    pub ref_gases: BTreeMap<EntityId, RefGas>,
    pub acid_temps: BTreeMap<EntityId, AcidTemp>,
    pub constants: ConstantTable,
    next_id: EntityId,
}

fn payload_id(command: &Command, field: &str) -> Result<EntityId, RemoteError> {
    command
        .payload
        .get(field)
        .and_then(Value::as_i64)
        .and_then(|id| EntityId::try_from(id).ok())
        .ok_or_else(|| RemoteError::failed(format!("{} without {}", command.name, field)))
}

fn payload_record<T: DeserializeOwned>(command: &Command, field: &str) -> Result<T, RemoteError> {
    let value = command
        .payload
        .get(field)
        .cloned()
        .ok_or_else(|| RemoteError::failed(format!("{} without {}", command.name, field)))?;
    serde_json::from_value(value).map_err(|err| RemoteError::failed(err.to_string()))
}

fn found<T: Serialize>(record: Option<&T>, what: &str, id: EntityId) -> Result<Value, RemoteError> {
    match record {
        Some(record) => to_value(record),
        None => Err(RemoteError::failed(format!("no {} with id {}", what, id))),
    }
}

fn to_value<T: Serialize>(record: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(record).map_err(|err| RemoteError::failed(err.to_string()))
}

impl LabServer {
    pub fn new() -> Self {
        Self {
            next_id: 1000,
            ..Self::default()
        }
    }

    pub fn with_mass_spec(mut self, mass_spec: MassSpec) -> Self {
        self.mass_specs.insert(mass_spec.id, mass_spec);
        self
    }

    pub fn with_standard(mut self, standard: Standard) -> Self {
        self.standards.insert(standard.id, standard);
        self
    }

    pub fn with_ref_gas(mut self, ref_gas: RefGas) -> Self {
        self.ref_gases.insert(ref_gas.id, ref_gas);
        self
    }

    pub fn with_acid_temp(mut self, acid_temp: AcidTemp) -> Self {
        self.acid_temps.insert(acid_temp.id, acid_temp);
        self
    }

    pub fn with_constant(mut self, constant: PhysicalConstant) -> Self {
        self.constants.constants.retain(|c| c.name != constant.name);
        self.constants.constants.push(constant);
        self
    }

    /// The reference gas index of `mass_spec_id` as the server derives it.
    pub fn ref_gas_list(&self, mass_spec_id: EntityId) -> RefGasList {
        RefGasList::new(
            mass_spec_id,
            self.ref_gases
                .values()
                .filter(|gas| gas.mass_spec_id == mass_spec_id)
                .map(|gas| RefGasSummary {
                    id: gas.id,
                    valid_from: gas.valid_from,
                })
                .collect(),
        )
    }

    fn assign_id(&mut self, id: EntityId) -> EntityId {
        if id != NO_ENTITY {
            return id;
        }
        self.next_id += 1;
        self.next_id
    }

    /// Answer one command.
    pub fn handle(&mut self, command: &Command) -> Result<Value, RemoteError> {
        match command.name.as_str() {
            "mass_spec.get" => {
                let id = payload_id(command, "id")?;
                found(self.mass_specs.get(&id), "mass spec", id)
            }
            "mass_spec.save" => {
                let mut mass_spec: MassSpec = payload_record(command, "mass_spec")?;
                mass_spec.id = self.assign_id(mass_spec.id);
                self.mass_specs.insert(mass_spec.id, mass_spec.clone());
                to_value(&mass_spec)
            }
            "standard.get" => {
                let id = payload_id(command, "id")?;
                found(self.standards.get(&id), "standard", id)
            }
            "standard.save" => {
                let mut standard: Standard = payload_record(command, "standard")?;
                standard.id = self.assign_id(standard.id);
                self.standards.insert(standard.id, standard.clone());
                to_value(&standard)
            }
            "standard.delete" => {
                let id = payload_id(command, "id")?;
                self.standards
                    .remove(&id)
                    .map(|_| Value::Null)
                    .ok_or_else(|| RemoteError::failed(format!("no standard with id {}", id)))
            }
            "ref_gas.get" => {
                let id = payload_id(command, "id")?;
                found(self.ref_gases.get(&id), "reference gas", id)
            }
            "ref_gas.list" => {
                let mass_spec_id = payload_id(command, "mass_spec_id")?;
                to_value(&self.ref_gas_list(mass_spec_id))
            }
            "ref_gas.save" => {
                let mut ref_gas: RefGas = payload_record(command, "ref_gas")?;
                ref_gas.id = self.assign_id(ref_gas.id);
                self.ref_gases.insert(ref_gas.id, ref_gas.clone());
                to_value(&ref_gas)
            }
            "ref_gas.delete" => {
                let id = payload_id(command, "id")?;
                self.ref_gases
                    .remove(&id)
                    .map(|_| Value::Null)
                    .ok_or_else(|| RemoteError::failed(format!("no reference gas with id {}", id)))
            }
            "acid_temp.get" => {
                let id = payload_id(command, "id")?;
                found(self.acid_temps.get(&id), "acid temperature", id)
            }
            "acid_temp.save" => {
                let mut acid_temp: AcidTemp = payload_record(command, "acid_temp")?;
                acid_temp.id = self.assign_id(acid_temp.id);
                self.acid_temps.insert(acid_temp.id, acid_temp.clone());
                to_value(&acid_temp)
            }
            "constants.get" => to_value(&self.constants),
            other => Err(RemoteError::Refused {
                reason: format!("unknown command {}", other),
            }),
        }
    }
}

// ============================================================================
// TEST LAB HARNESS
// ============================================================================

/// Lab caches wired to a [`MockRemote`] plus a [`LabServer`] to answer it.
///
/// Nothing is answered until the test calls [`TestLab::serve`], so tests
/// control exactly when completions arrive.
pub struct TestLab {
    pub remote: Arc<MockRemote>,
    pub caches: LabCaches,
    server: Mutex<LabServer>,
}

impl TestLab {
    pub fn new(server: LabServer) -> Self {
        Self::with_config(server, CacheConfig::default())
    }

    pub fn with_config(server: LabServer, config: CacheConfig) -> Self {
        let remote = Arc::new(MockRemote::new());
        let caches = LabCaches::new(remote.clone(), config).expect("lab caches");
        Self {
            remote,
            caches,
            server: Mutex::new(server),
        }
    }

    pub fn server(&self) -> MutexGuard<'_, LabServer> {
        self.server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer every outstanding command, including ones submitted while
    /// answering. Returns how many commands were answered.
    pub fn serve(&self) -> usize {
        let mut answered = 0;
        loop {
            let commands = self.remote.drain();
            if commands.is_empty() {
                return answered;
            }
            for command in commands {
                let outcome = self.server().handle(&command);
                self.complete(Completion {
                    id: command.id,
                    outcome,
                });
                answered += 1;
            }
        }
    }

    /// Answer only the outstanding commands named `name`; the rest stay queued.
    pub fn serve_named(&self, name: &str) -> usize {
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .remote
            .drain()
            .into_iter()
            .partition(|command| command.name == name);
        for command in rest {
            easotope_events::RemoteChannel::submit(&*self.remote, command);
        }
        let count = matching.len();
        for command in matching {
            let outcome = self.server().handle(&command);
            self.complete(Completion {
                id: command.id,
                outcome,
            });
        }
        count
    }

    /// Fail every outstanding command with `error`.
    pub fn fail_all(&self, error: RemoteError) -> usize {
        let commands = self.remote.drain();
        let count = commands.len();
        for command in commands {
            self.complete(Completion::err(command.id, error.clone()));
        }
        count
    }

    pub fn complete(&self, completion: Completion) {
        let handled = self.caches.hub.complete(&completion).expect("complete");
        assert!(handled, "no cache owns completion {}", completion.id);
    }

    /// Deliver a push event to every cache.
    pub fn push(&self, event: Event) {
        self.caches.hub.apply_event(&event).expect("apply event");
    }

    pub fn pending_commands(&self) -> usize {
        self.remote.submitted_count()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating lab entity types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a positive entity id.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1..10_000i32
    }

    /// Generate a Timestamp within a reasonable range (2010-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_262_304_000i64..1_893_456_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_standard() -> impl Strategy<Value = Standard> {
        (
            arb_entity_id(),
            "[A-Z]{3,4}-?[0-9]{1,3}",
            proptest::option::of("[a-z ]{0,24}"),
            any::<bool>(),
        )
            .prop_map(|(id, name, description, enabled)| Standard {
                id,
                name,
                description,
                enabled,
            })
    }

    pub fn arb_mass_spec() -> impl Strategy<Value = MassSpec> {
        (arb_entity_id(), "[A-Z][a-z]{2,8} [0-9]{3}")
            .prop_map(|(id, name)| fixtures::mass_spec(id, &name))
    }

    pub fn arb_ref_gas(mass_spec_id: EntityId) -> impl Strategy<Value = RefGas> {
        (
            arb_entity_id(),
            arb_timestamp(),
            proptest::option::of(-60.0..10.0f64),
            proptest::option::of(-40.0..40.0f64),
        )
            .prop_map(move |(id, valid_from, delta13c, delta18o)| RefGas {
                id,
                mass_spec_id,
                valid_from,
                description: None,
                delta13c,
                delta18o,
            })
    }

    /// Reference gases of one mass spec with distinct ids and start dates.
    pub fn arb_ref_gas_history(mass_spec_id: EntityId) -> impl Strategy<Value = Vec<RefGas>> {
        proptest::collection::btree_set(1_262_304_000i64..1_893_456_000i64, 1..8).prop_map(
            move |starts| {
                starts
                    .into_iter()
                    .enumerate()
                    .map(|(n, secs)| {
                        let valid_from = chrono::DateTime::from_timestamp(secs, 0)
                            .unwrap_or_else(chrono::Utc::now);
                        fixtures::ref_gas(100 + n as EntityId, mass_spec_id, valid_from)
                    })
                    .collect()
            },
        )
    }

    pub fn arb_acid_temp() -> impl Strategy<Value = AcidTemp> {
        (arb_entity_id(), 25.0..100.0f64, 1.008..1.011f64).prop_map(
            |(id, temperature, fractionation_factor)| AcidTemp {
                id,
                sample_type_id: 1,
                temperature,
                fractionation_factor,
                description: None,
            },
        )
    }

    pub fn arb_constant() -> impl Strategy<Value = PhysicalConstant> {
        ("[A-Z][A-Z0-9_]{1,10}", -1.0e3..1.0e3f64, "(ratio|permil|K)")
            .prop_map(|(name, value, unit)| PhysicalConstant::new(name, value, unit))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// Midnight UTC on the given day of 2024.
    pub fn day(month: u32, day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0)
            .single()
            .expect("valid date")
    }

    pub fn mass_spec(id: EntityId, name: &str) -> MassSpec {
        MassSpec {
            id,
            name: name.to_string(),
            description: None,
            serial_number: None,
        }
    }

    pub fn standard(id: EntityId, name: &str) -> Standard {
        Standard {
            id,
            name: name.to_string(),
            description: None,
            enabled: true,
        }
    }

    pub fn ref_gas(id: EntityId, mass_spec_id: EntityId, valid_from: Timestamp) -> RefGas {
        RefGas {
            id,
            mass_spec_id,
            valid_from,
            description: None,
            delta13c: Some(-3.6),
            delta18o: Some(-8.1),
        }
    }

    pub fn acid_temp(id: EntityId, temperature: f64) -> AcidTemp {
        AcidTemp {
            id,
            sample_type_id: 1,
            temperature,
            fractionation_factor: 1.00871,
            description: None,
        }
    }

    /// Isotope ratio constants used by the bulk CO2 calculation.
    pub fn constants() -> Vec<PhysicalConstant> {
        vec![
            PhysicalConstant::new("R13_VPDB", 0.011180, "ratio"),
            PhysicalConstant::new("R18_VSMOW", 0.0020052, "ratio"),
            PhysicalConstant::new("R17_VSMOW", 0.00038475, "ratio"),
            PhysicalConstant::new("LAMBDA_17", 0.528, "ratio"),
        ]
    }

    /// One mass spec (id 4) with two reference gases, the second
    /// replacing the first on March 10th; standard 7 "NBS19"; acid
    /// temperature 2 at 70 degrees; and the isotope constants.
    pub fn lab_server() -> LabServer {
        let mut server = LabServer::new()
            .with_mass_spec(mass_spec(4, "Delta V 253"))
            .with_ref_gas(ref_gas(10, 4, day(3, 1)))
            .with_ref_gas(ref_gas(11, 4, day(3, 10)))
            .with_standard(standard(7, "NBS19"))
            .with_acid_temp(acid_temp(2, 70.0));
        for constant in constants() {
            server = server.with_constant(constant);
        }
        server
    }

    pub fn test_lab() -> TestLab {
        TestLab::new(lab_server())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for cache and dependency results.

    use super::*;

    /// Assert that an EasotopeResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &EasotopeResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that an EasotopeResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &EasotopeResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &EasotopeResult<T>) {
        match result {
            Err(EasotopeError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_dependency_error<T: std::fmt::Debug>(result: &EasotopeResult<T>) {
        match result {
            Err(EasotopeError::Dependency(_)) => {}
            other => panic!("Expected Dependency error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &EasotopeResult<T>) {
        match result {
            Err(EasotopeError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that `remote` received exactly `expected` commands named `name`.
    #[track_caller]
    pub fn assert_submitted(remote: &MockRemote, name: &str, expected: usize) {
        let count = remote.named(name).len();
        assert_eq!(
            count, expected,
            "Expected {} {} commands, found {}",
            expected, name, count
        );
    }

    /// Assert that a correlation id refers to an outstanding command.
    #[track_caller]
    pub fn assert_issued(id: CorrelationId) {
        assert!(id.is_some(), "Expected a correlation id, got NONE");
    }

    /// Assert that a `get` was answered from cache.
    #[track_caller]
    pub fn assert_answered_from_cache(id: CorrelationId) {
        assert!(id.is_none(), "Expected a cache hit, got {}", id);
    }
}

// ============================================================================
// TESTS
// ============================================================================
