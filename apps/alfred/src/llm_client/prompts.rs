// Prompt fragments shared by every LLM caller.
// Each caller keeps its own prompts.rs next to it for task-specific text.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to generation prompts: every claim must come from supplied evidence.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every claim you write must be traceable to one of the evidence \
    snippets provided below or to the candidate profile. Do NOT infer, \
    interpolate, or invent employers, dates, metrics, or skills. \
    If the evidence does not support a claim, omit it.";
