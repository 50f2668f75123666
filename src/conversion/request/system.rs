use crate::constants::CONTENT_TEXT;
use crate::models::{AnthropicSystem, AnthropicSystemBlock};

pub fn extract_system_text(system: &AnthropicSystem) -> String {
    match system {
        AnthropicSystem::Text(text) => text.to_string(),
        AnthropicSystem::Blocks(blocks) => {
            let text_parts: Vec<&str> = blocks
                .iter()
                .filter_map(extract_system_block_text)
                .collect();
            text_parts.join("\n\n")
        }
    }
}

fn extract_system_block_text(block: &AnthropicSystemBlock) -> Option<&str> {
    if block.block_type != CONTENT_TEXT {
        return None;
    }
    Some(block.text.as_str())
}
