use crate::constants::ROLE_USER;
use crate::conversion::request::models::{ChatContentPart, ChatMessage, ChatMessageContent};
use crate::models::{AnthropicContent, AnthropicContentBlock, AnthropicImageSource};

/// Converts the non-`tool_result` part of a user turn. Returns `None` when
/// nothing but tool results was present.
pub fn convert_user_message(content: &AnthropicContent) -> Option<ChatMessage> {
    let blocks = match content {
        AnthropicContent::Text(text) => return Some(ChatMessage::text(ROLE_USER, text.as_str())),
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let parts: Vec<ChatContentPart> = blocks.iter().filter_map(convert_user_block).collect();
    if parts.is_empty() {
        return None;
    }

    let has_image = parts.iter().any(ChatContentPart::is_image);
    let content = if has_image {
        ChatMessageContent::Parts(parts)
    } else {
        ChatMessageContent::Text(join_text_parts(blocks))
    };

    Some(ChatMessage {
        role: ROLE_USER.to_string(),
        content: Some(content),
        ..Default::default()
    })
}

fn convert_user_block(block: &AnthropicContentBlock) -> Option<ChatContentPart> {
    match block {
        AnthropicContentBlock::Text { text } => Some(ChatContentPart::text(text.as_str())),
        AnthropicContentBlock::Image { source } => image_data_url(source).map(ChatContentPart::image_url),
        _ => None,
    }
}

fn image_data_url(source: &AnthropicImageSource) -> Option<String> {
    if source.source_type != "base64" || source.media_type.is_empty() || source.data.is_empty() {
        return None;
    }
    Some(format!("data:{};base64,{}", source.media_type, source.data))
}

fn join_text_parts(blocks: &[AnthropicContentBlock]) -> String {
    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    texts.join("\n\n")
}
