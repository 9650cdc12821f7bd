use crate::clock::Clock;
use crate::db::Db;
use crate::errors::ApiError;
use crate::store::RecordStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use zk_proofs::groth16::{
    deserialize_pk, deserialize_vk, serialize_pk, serialize_vk, setup_membership_keys,
    setup_range_keys, PredicateKeys,
};

use rand::rngs::OsRng;

/// Holder-scoped context threaded through every handler. Not a process
/// singleton: tests build as many as they like.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub records: RecordStore,
    pub clock: Arc<dyn Clock>,
    pub data_dir: PathBuf,
    keys: Arc<OnceCell<PredicateKeys>>,
}

impl AppState {
    pub fn new(db: Db, data_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            records: RecordStore::new(),
            clock,
            data_dir,
            keys: Arc::new(OnceCell::new()),
        }
    }

    /// Ensure Groth16 keys for both circuit shapes exist on disk and in
    /// memory.
    ///
    /// This runs the trusted setup (prototype) on first use. In production,
    /// use an MPC setup or a transparent proof system.
    pub async fn ensure_keys(&self) -> Result<PredicateKeys, ApiError> {
        let data_dir = self.data_dir.clone();

        self.keys
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || {
                    let keys_dir = data_dir.join("keys");
                    std::fs::create_dir_all(&keys_dir).map_err(|_| ApiError::Internal)?;

                    let range =
                        load_or_setup(&keys_dir, "range", |rng| setup_range_keys(rng))?;
                    let membership =
                        load_or_setup(&keys_dir, "membership", |rng| setup_membership_keys(rng))?;

                    Ok::<PredicateKeys, ApiError>(PredicateKeys {
                        range_pk: Arc::new(range.0),
                        range_vk: Arc::new(range.1),
                        membership_pk: Arc::new(membership.0),
                        membership_vk: Arc::new(membership.1),
                    })
                })
                .await
                .map_err(|_| ApiError::Internal)?
            })
            .await
            .cloned()
    }
}

type KeyPair = (
    ark_groth16::ProvingKey<ark_bn254::Bn254>,
    ark_groth16::VerifyingKey<ark_bn254::Bn254>,
);

fn load_or_setup(
    keys_dir: &std::path::Path,
    shape: &str,
    setup: impl FnOnce(&mut OsRng) -> Result<KeyPair, zk_proofs::error::ZkError>,
) -> Result<KeyPair, ApiError> {
    let pk_path = keys_dir.join(format!("groth16_{shape}_pk.bin"));
    let vk_path = keys_dir.join(format!("groth16_{shape}_vk.bin"));

    if pk_path.exists() && vk_path.exists() {
        let pk_bytes = std::fs::read(&pk_path).map_err(|_| ApiError::Internal)?;
        let vk_bytes = std::fs::read(&vk_path).map_err(|_| ApiError::Internal)?;

        let pk = deserialize_pk(&pk_bytes).map_err(|_| ApiError::Internal)?;
        let vk = deserialize_vk(&vk_bytes).map_err(|_| ApiError::Internal)?;
        return Ok((pk, vk));
    }

    let mut rng = OsRng;
    let (pk, vk) = setup(&mut rng).map_err(|_| ApiError::Internal)?;

    std::fs::write(&pk_path, serialize_pk(&pk).map_err(|_| ApiError::Internal)?)
        .map_err(|_| ApiError::Internal)?;
    std::fs::write(&vk_path, serialize_vk(&vk).map_err(|_| ApiError::Internal)?)
        .map_err(|_| ApiError::Internal)?;

    Ok((pk, vk))
}
