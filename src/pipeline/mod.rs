//! Pipeline stages for image forensics.
//!
//! Each submodule is one analysis concern and knows nothing about jobs or
//! progress; [`crate::job`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ extract ──▶ coords ──▶ geo ─────┐
//! input ─────┤  (cascade)   (DMS→deg)  (address) ├──▶ ForensicReport
//! (bytes)    └─▶ ela ────────────────────────────┘
//!               (recompress + diff)
//! ```
//!
//! 1. [`input`]  : extension whitelist, size cap, single read into memory
//! 2. [`extract`]: five independent decoders merged under prefixed keys;
//!    CPU-bound, runs in `spawn_blocking`
//! 3. [`coords`] : degree/minute/second rationals and ISO 6709 strings to
//!    signed decimal degrees
//! 4. [`geo`]    : reverse geocoding with cache, rate gate and provider
//!    fallback; the only stage with network I/O
//! 5. [`ela`]    : Error Level Analysis score and difference image

pub mod coords;
pub mod ela;
pub mod extract;
pub mod geo;
pub mod input;
