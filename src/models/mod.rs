mod api_key;
mod audit_log;
mod chat;
mod group;
mod model;
mod token_usage;
mod user;
mod validators;

pub use api_key::{API_KEY_PREFIX, ApiKey, ApiKeyWithSecret, CreateApiKey};
pub use audit_log::AuditLog;
pub use chat::{
    ChatCompletionChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, ChatMessageDelta, CompletionChoice, CompletionRequest, CompletionResponse,
    ModelInfo, ModelsResponse, Usage,
};
pub use group::{CreateGroup, Group, UpdateGroup};
pub use model::{CreateModel, Model, ModelStatus, Provider, UpdateModel};
pub use token_usage::TokenUsage;
pub use user::{CreateUser, UpdateUser, User};
