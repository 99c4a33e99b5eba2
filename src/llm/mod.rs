//! @ai:module:intent Model provider clients
//! @ai:module:layer infrastructure
//! @ai:module:public_api LlmClient, AnthropicClient, MockLlmClient, LlmResponse, ClientError, TOO_MANY_REQUESTS

pub mod client;

pub use client::{
    AnthropicClient, ClientError, LlmClient, LlmResponse, MockLlmClient, TOO_MANY_REQUESTS,
};
