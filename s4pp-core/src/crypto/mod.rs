//! Crypto primitives consumed by the protocol engine: SHA-256/HMAC-SHA256
//! (`hmac_sha256`), AES-128-CBC (`cipher`), ASCII-hex (`hex`) and a random
//! byte source (`random`).
//!
//! The original teacher crate backed its session crypto with
//! `libsodium-sys`'s ChaCha20-Poly1305-IETF AEAD
//! (`t51core/src/net/crypto.rs`, `server/lib/flux/src/crypto.rs`); that
//! algorithm family cannot satisfy the SHA-256/HMAC-SHA256/AES-128-CBC
//! wire contract, so this module is built on the RustCrypto crates instead
//! (see `DESIGN.md`).

pub mod cipher;
pub mod hex;
pub mod hmac_sha256;
pub mod random;

pub use hmac_sha256::{compute as hmac_sha256, Incremental as HmacAccumulator};
pub use random::{OsRandom, RandomSource};
