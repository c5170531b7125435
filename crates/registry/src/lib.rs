//! Authoritative miner directory: registration, liveness, and capability
//! search.
//!
//! [`MinerRegistry`] is a thin façade over [`coordinator_store::Store`]; it
//! owns no state of its own beyond the `Clock`/`Store` handles it is
//! constructed with, so every fact it reports is re-derivable from Store on
//! restart.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod error;

use std::collections::BTreeSet;
use std::sync::Arc;

use coordinator_clock::Clock;
use coordinator_primitives::{Capability, CapabilityRequirement, Miner, MinerId, MinerStatus, TenantId, TimestampMs};
use coordinator_store::Store;
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};

pub use error::RegistryError;

/// The outcome of one liveness-decay pass: miners newly marked `OFFLINE` and
/// the jobs that were in-flight on them when the scan observed them.
/// Callers (`coordinator-lifecycle`) invoke `on_miner_lost` for each job.
#[derive(Debug, Clone, Default)]
pub struct LivenessSweepOutcome {
    /// `(miner_id, jobs that were in-flight)` for each miner newly offlined.
    pub newly_offline: Vec<(MinerId, Vec<coordinator_primitives::JobId>)>,
}

/// Authoritative directory of registered miners.
#[derive(Debug)]
pub struct MinerRegistry {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl MinerRegistry {
    /// Creates a registry backed by `store`, using `clock` for timestamps.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Registers a new miner, or re-registers an existing one idempotently
    /// on `(public_key, tenant_id)`.
    pub fn register(
        &self,
        tenant_id: TenantId,
        id_gen: &dyn coordinator_clock::IdGen,
        public_key: String,
        capabilities: Vec<Capability>,
        price_per_unit: coordinator_primitives::Amount,
        max_concurrency: u32,
    ) -> Result<MinerId, RegistryError> {
        let now = self.clock.now_ms();
        let miner = Miner {
            id: MinerId::from(id_gen.generate()),
            tenant_id,
            public_key,
            capabilities,
            price_per_unit,
            status: MinerStatus::Active,
            registered_ms: now,
            last_heartbeat_ms: now,
            in_flight_jobs: BTreeSet::new(),
            max_concurrency,
        };
        Ok(self.store.register_miner(miner)?)
    }

    /// Verifies `signature` over `nonce` using the miner's stored public key
    /// and, on success, updates its heartbeat.
    pub fn heartbeat(&self, miner_id: &MinerId, nonce: &[u8], signature: &[u8]) -> Result<TimestampMs, RegistryError> {
        let miner = self.store.get_miner(miner_id)?.ok_or_else(|| RegistryError::UnknownMiner(miner_id.clone()))?;
        if miner.status != MinerStatus::Active && miner.status != MinerStatus::Draining {
            return Err(RegistryError::MinerNotActive(miner_id.clone()));
        }
        self.verify_nonce(&miner, nonce, signature)?;

        let now = self.clock.now_ms();
        self.store.touch_miner_heartbeat(miner_id, now)?;
        Ok(now)
    }

    fn verify_nonce(&self, miner: &Miner, nonce: &[u8], signature: &[u8]) -> Result<(), RegistryError> {
        let key_bytes: [u8; 32] = hex_decode(&miner.public_key)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| RegistryError::InvalidKeyMaterial(miner.id.clone()))?;
        let verifying_key =
            VerifyingKey::from_bytes(&key_bytes).map_err(|_| RegistryError::InvalidKeyMaterial(miner.id.clone()))?;
        let sig_bytes: [u8; 64] =
            signature.try_into().map_err(|_| RegistryError::AuthFailed(miner.id.clone()))?;
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(nonce, &signature).map_err(|_| RegistryError::AuthFailed(miner.id.clone()))
    }

    /// Marks a miner `DRAINING`: ineligible for new assignments, but
    /// in-flight jobs run to completion.
    pub fn drain(&self, miner_id: &MinerId) -> Result<(), RegistryError> {
        Ok(self.store.set_miner_status(miner_id, MinerStatus::Draining, MinerStatus::Active)?)
    }

    /// Returns a `DRAINING` miner to `ACTIVE`.
    pub fn resume(&self, miner_id: &MinerId) -> Result<(), RegistryError> {
        Ok(self.store.set_miner_status(miner_id, MinerStatus::Active, MinerStatus::Draining)?)
    }

    /// Returns up to `limit` `ACTIVE` miners satisfying `requirement`, not in
    /// `exclude`, ordered by ascending price then most-recent heartbeat.
    pub fn search(
        &self,
        requirement: &CapabilityRequirement,
        exclude: &BTreeSet<MinerId>,
        limit: usize,
    ) -> Result<Vec<MinerId>, RegistryError> {
        let now = self.clock.now_ms();
        let mut matches: Vec<Miner> = self
            .store
            .scan_miners(Some(MinerStatus::Active), 0)?
            .into_iter()
            .filter(|m| !exclude.contains(&m.id) && m.satisfies(requirement))
            .collect();
        matches.sort_by(|a, b| {
            a.price_per_unit
                .cmp(&b.price_per_unit)
                .then((now.0.saturating_sub(a.last_heartbeat_ms.0)).cmp(&(now.0.saturating_sub(b.last_heartbeat_ms.0))))
        });
        matches.truncate(limit);
        Ok(matches.into_iter().map(|m| m.id).collect())
    }

    /// Runs one liveness-decay pass over every non-`OFFLINE` miner: marks
    /// any whose heartbeat is older than `liveness_timeout_ms` as `OFFLINE`,
    /// in two ordered steps per miner (status flip, then snapshot its
    /// in-flight jobs) so a restart mid-scan is safe — the next pass simply
    /// re-finds the miner, still `OFFLINE`, with its jobs not yet cleared.
    pub fn run_liveness_scan(&self, liveness_timeout_ms: u64, batch_max: usize) -> Result<LivenessSweepOutcome, RegistryError> {
        let now = self.clock.now_ms();
        let mut outcome = LivenessSweepOutcome::default();
        let candidates = self.store.scan_miners(Some(MinerStatus::Active), batch_max)?.into_iter().chain(
            self.store.scan_miners(Some(MinerStatus::Draining), batch_max)?,
        );
        for miner in candidates {
            if now.0.saturating_sub(miner.last_heartbeat_ms.0) < liveness_timeout_ms {
                continue;
            }
            let prev = miner.status;
            if self.store.set_miner_status(&miner.id, MinerStatus::Offline, prev).is_ok() {
                let jobs: Vec<_> = miner.in_flight_jobs.into_iter().collect();
                tracing::info!(miner_id = %miner.id, job_count = jobs.len(), "registry: miner marked offline by liveness scan");
                outcome.newly_offline.push((miner.id, jobs));
            }
        }
        Ok(outcome)
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use coordinator_clock::{FakeClock, FakeIdGen};
    use coordinator_primitives::Amount;
    use coordinator_store::MemStore;
    use ed25519_dalek::{Signer as _, SigningKey};
    use rand::rngs::OsRng;

    use super::*;

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn cap(model: &str) -> Capability {
        Capability { model: model.into(), mem_bytes: 1_000, region: None, features: vec![] }
    }

    #[test]
    fn register_is_idempotent_on_public_key_and_tenant() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let registry = MinerRegistry::new(store, clock);
        let id_gen = FakeIdGen::new("miner");

        let id1 = registry
            .register(TenantId::from("t1"), &id_gen, "pk".into(), vec![cap("m1")], Amount(10), 2)
            .unwrap();
        let id2 = registry
            .register(TenantId::from("t1"), &id_gen, "pk".into(), vec![cap("m1"), cap("m2")], Amount(10), 2)
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn heartbeat_verifies_signature_and_updates_timestamp() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(1_000));
        let registry = MinerRegistry::new(store.clone(), clock.clone());
        let id_gen = FakeIdGen::new("miner");

        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let public_key_hex = hex_encode(&signing_key.verifying_key().to_bytes());

        let miner_id = registry
            .register(TenantId::from("t1"), &id_gen, public_key_hex, vec![cap("m1")], Amount(10), 2)
            .unwrap();

        let nonce = b"nonce-1";
        let signature = signing_key.sign(nonce);

        let ack_at = registry.heartbeat(&miner_id, nonce, &signature.to_bytes()).unwrap();
        assert_eq!(ack_at, TimestampMs(1_000));

        let bad_sig = [0u8; 64];
        assert!(matches!(registry.heartbeat(&miner_id, nonce, &bad_sig), Err(RegistryError::AuthFailed(_))));
    }

    #[test]
    fn drain_then_resume_round_trips_status() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(0));
        let registry = MinerRegistry::new(store.clone(), clock);
        let id_gen = FakeIdGen::new("miner");
        let miner_id = registry
            .register(TenantId::from("t1"), &id_gen, "pk".into(), vec![cap("m1")], Amount(10), 2)
            .unwrap();

        registry.drain(&miner_id).unwrap();
        assert_eq!(store.get_miner(&miner_id).unwrap().unwrap().status, MinerStatus::Draining);
        registry.resume(&miner_id).unwrap();
        assert_eq!(store.get_miner(&miner_id).unwrap().unwrap().status, MinerStatus::Active);
    }

    #[test]
    fn liveness_scan_offlines_stale_miners_and_reports_their_jobs() {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let clock = Arc::new(FakeClock::new(0));
        let registry = MinerRegistry::new(store.clone(), clock.clone());
        let id_gen = FakeIdGen::new("miner");
        let miner_id = registry
            .register(TenantId::from("t1"), &id_gen, "pk".into(), vec![cap("m1")], Amount(10), 2)
            .unwrap();
        store.mutate_miner_in_flight(&miner_id, Some(&coordinator_primitives::JobId::from("j1")), None).unwrap();

        clock.advance(30_001);
        let outcome = registry.run_liveness_scan(30_000, 0).unwrap();
        assert_eq!(outcome.newly_offline.len(), 1);
        assert_eq!(outcome.newly_offline[0].0, miner_id);
        assert_eq!(outcome.newly_offline[0].1, vec![coordinator_primitives::JobId::from("j1")]);
        assert_eq!(store.get_miner(&miner_id).unwrap().unwrap().status, MinerStatus::Offline);
    }
}
