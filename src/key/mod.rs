//! # Keys
//!
//! Typed key material, the string codec that produces it, and [`Keypair`],
//! which binds material to a currency plugin.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              KEY LAYER                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   "5HueCGU8..." ──► codec::decode ──► KeyMaterial ──┐                   │
//! │   "6PRVWUbk..."                         │            │                  │
//! │   "3yK88..."                            │            ▼                  │
//! │                                         │      Keypair (plugin + key)   │
//! │                                         │       encrypt / decrypt       │
//! │                     codec::encode ◄─────┘       split / combine         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod keypair;
pub mod material;

pub use keypair::Keypair;
pub use material::{KeyMaterial, KeyState, PrivateKey};
