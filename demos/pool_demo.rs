//! # Example: pool_demo
//!
//! Opens a worker pool next to a custom component and runs a few jobs.
//!
//! Demonstrates how to:
//! - Implement [`Component`] and drive it with a [`LifecycleController`].
//! - Configure the pool through [`Options`].
//! - Run crypto jobs through the typed [`WorkerPool`] helpers.
//!
//! ## Flow
//! ```text
//! Context::builder(cfg).build()
//!     ├─► chain.open()      → PreOpen, Open
//!     ├─► pool.open()       → PreOpen, Open
//!     ├─► pool.mine / scrypt / ec_sign / ec_verify
//!     ├─► pool.close()      → drain → AllStoppedWithin → Close
//!     └─► chain.close()     → PreClose, Close
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example pool_demo
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tracing_subscriber::EnvFilter;
use workvisor::jobs::crypto;
use workvisor::{Component, Config, Context, LifecycleController, LogWriter, Options, Subscribe};

struct Chain;

#[async_trait]
impl Component for Chain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn on_open(&self) -> anyhow::Result<()> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(())
    }

    async fn on_close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut cfg = Config::default();
    cfg.set(Options {
        workers_size: Some(2),
        workers_timeout: Some(10_000),
        ..Options::default()
    });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ctx = Context::builder(cfg).with_subscribers(subs).build();
    let chain = LifecycleController::new(Arc::new(Chain), ctx.bus().clone());

    // concurrent opens coalesce into one hook run
    let (a, b) = tokio::join!(chain.open(), chain.open());
    a?;
    b?;

    let pool = ctx.pool();
    pool.open().await?;

    let mut header = vec![0u8; 80];
    header[..4].copy_from_slice(&1u32.to_le_bytes());
    let mut target = [0xff; 32];
    target[31] = 0x00;
    target[30] = 0x0f;
    match pool.mine(header, target, 0, 1_000_000).await? {
        Some(nonce) => println!("mined nonce {nonce}"),
        None => println!("no nonce in range"),
    }

    let key = pool.scrypt(b"password".to_vec(), b"salt".to_vec(), 1024, 8, 1, 32).await?;
    println!("scrypt key {}", key.iter().map(|b| format!("{b:02x}")).collect::<String>());

    let secret = [0x07; 32];
    let msg = crypto::hash256(b"hello").to_vec();
    let sig = pool.ec_sign(msg.clone(), secret.to_vec()).await?;
    println!("signature is {} bytes of DER", sig.len());

    let public = PublicKey::from_secret_key(&Secp256k1::new(), &SecretKey::from_slice(&secret)?)
        .serialize()
        .to_vec();
    let valid = pool.ec_verify(msg.clone(), sig.clone(), public.clone()).await?;
    let cached = pool.ec_verify(msg, sig, public).await?;
    println!("verified: {valid}, again from cache: {cached} ({} cached)", pool.sig_cache().len());

    chain.close().await?;
    ctx.shutdown().await?;
    Ok(())
}
