mod chunk;
mod events;
mod sse;
mod state;
mod translator;

pub use chunk::ChatCompletionChunk;
pub use events::AnthropicStreamEvent;
pub use sse::encode_event;
pub use translator::{StreamFailure, StreamTranslator};
