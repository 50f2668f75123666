use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::catalog::Model;
use crate::constants::ROLE_ASSISTANT;
use crate::conversion::request::{ChatCompletionsPayload, ChatContentPart, ChatMessage, ChatMessageContent, TypedContentPart};

const MESSAGE_OVERHEAD_TOKENS: u64 = 3;
const NAME_OVERHEAD_TOKENS: u64 = 1;
const REPLY_PRIMER_TOKENS: u64 = 3;

/// Local estimate of a chat payload. `input` covers every non-assistant
/// message plus tool definitions; `output` covers assistant messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCount {
    pub input: u64,
    pub output: u64,
}

static O200K: OnceLock<Option<CoreBPE>> = OnceLock::new();
static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoding_for(tokenizer: Option<&str>) -> Result<&'static CoreBPE, String> {
    let (cell, name, load): (_, _, fn() -> Option<CoreBPE>) = match tokenizer {
        Some("o200k_base") => (&O200K, "o200k_base", || tiktoken_rs::o200k_base().ok()),
        _ => (&CL100K, "cl100k_base", || tiktoken_rs::cl100k_base().ok()),
    };
    cell.get_or_init(load)
        .as_ref()
        .ok_or_else(|| format!("failed to load {name} tokenizer"))
}

pub fn count_tokens(payload: &ChatCompletionsPayload, model: &Model) -> Result<TokenCount, String> {
    let bpe = encoding_for(model.capabilities.tokenizer.as_deref())?;
    let encode = |text: &str| bpe.encode_with_special_tokens(text).len() as u64;

    let mut count = TokenCount::default();
    for message in &payload.messages {
        let tokens = message_tokens(message, &encode);
        if message.role == ROLE_ASSISTANT {
            count.output += tokens;
        } else {
            count.input += tokens;
        }
    }

    for tool in payload.tools.iter().flatten() {
        let definition = serde_json::to_string(tool).unwrap_or_default();
        count.input += encode(&definition);
    }

    if !payload.messages.is_empty() {
        count.input += REPLY_PRIMER_TOKENS;
    }
    Ok(count)
}

fn message_tokens(message: &ChatMessage, encode: &impl Fn(&str) -> u64) -> u64 {
    let mut tokens = MESSAGE_OVERHEAD_TOKENS + encode(&message.role);

    if let Some(name) = &message.name {
        tokens += NAME_OVERHEAD_TOKENS + encode(name);
    }

    match &message.content {
        Some(ChatMessageContent::Text(text)) => tokens += encode(text),
        Some(ChatMessageContent::Parts(parts)) => {
            for part in parts {
                if let ChatContentPart::Typed(TypedContentPart::Text { text }) = part {
                    tokens += encode(text);
                }
            }
        }
        None => {}
    }

    for tool_call in message.tool_calls.iter().flatten() {
        tokens += encode(&tool_call.function.name) + encode(&tool_call.function.arguments);
    }

    tokens
}
