//! One module per supported model dialect, plus `common`, the shared
//! body-grammar helpers several of them build on.

pub mod common;

pub mod cogito;
pub mod function_gemma;
pub mod glm46;
pub mod lfm2;
pub mod ministral;
pub mod olmo3;
pub mod plain;
pub mod qwen3_coder;
