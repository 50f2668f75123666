use crate::models::AnthropicCountTokensRequest;
use crate::tokenizer::TokenCount;

/// Tool-use system prompt overhead added when tools are declared.
pub const CLAUDE_TOOL_SURCHARGE: u64 = 346;
pub const GROK_TOOL_SURCHARGE: u64 = 480;

/// Correction from the local tokenizer to the vendor's own count.
pub const CLAUDE_SCALE: f64 = 1.15;
pub const GROK_SCALE: f64 = 1.03;

const MCP_TOOL_PREFIX: &str = "mcp__";
const CLAUDE_CODE_BETA_PREFIX: &str = "claude-code";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelFamily {
    Claude,
    Grok,
    Other,
}

impl ModelFamily {
    fn of(model_id: &str) -> Self {
        if model_id.starts_with("claude") {
            Self::Claude
        } else if model_id.starts_with("grok") {
            Self::Grok
        } else {
            Self::Other
        }
    }

    fn tool_surcharge(self) -> u64 {
        match self {
            Self::Claude => CLAUDE_TOOL_SURCHARGE,
            Self::Grok => GROK_TOOL_SURCHARGE,
            Self::Other => 0,
        }
    }

    fn scale(self, tokens: u64) -> u64 {
        let factor = match self {
            Self::Claude => CLAUDE_SCALE,
            Self::Grok => GROK_SCALE,
            Self::Other => return tokens,
        };
        (tokens as f64 * factor).round() as u64
    }
}

/// Applies the per-family surcharge and scale to a raw tokenizer count and
/// returns the figure reported as `input_tokens`.
pub fn adjust_token_count(
    raw: TokenCount,
    request: &AnthropicCountTokensRequest,
    anthropic_beta: Option<&str>,
) -> u64 {
    let family = ModelFamily::of(&request.model);
    let mut input = raw.input;

    let tools = request.tools.as_deref().unwrap_or_default();
    if !tools.is_empty() && !has_injected_mcp_tool(request, anthropic_beta) {
        input += family.tool_surcharge();
    }

    family.scale(input + raw.output)
}

/// Claude Code injects its own MCP tools; those requests already carry the
/// tool overhead in the prompt.
fn has_injected_mcp_tool(request: &AnthropicCountTokensRequest, anthropic_beta: Option<&str>) -> bool {
    if !anthropic_beta.is_some_and(|beta| beta.starts_with(CLAUDE_CODE_BETA_PREFIX)) {
        return false;
    }
    request
        .tools
        .iter()
        .flatten()
        .any(|tool| tool.name.starts_with(MCP_TOOL_PREFIX))
}
