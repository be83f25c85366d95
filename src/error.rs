//! Error types for block assembly

use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum AssemblyError {
    #[error("Chain access failed: {0}")]
    ChainAccess(Cow<'static, str>),

    #[error("Block read failed at height {0}")]
    BlockRead(u32),

    #[error("Contract state access failed: {0}")]
    ContractState(Cow<'static, str>),

    #[error("Contract execution failed: {0}")]
    ContractExecution(Cow<'static, str>),

    #[error("Script error: {0}")]
    Script(Cow<'static, str>),

    #[error("Address encoding failed: {0}")]
    Address(Cow<'static, str>),

    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    #[error("Block validity check failed: {0}")]
    BlockValidity(Cow<'static, str>),

    #[error("Arithmetic overflow: {0}")]
    Overflow(Cow<'static, str>),
}

pub type Result<T> = std::result::Result<T, AssemblyError>;
