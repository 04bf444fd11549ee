//! Workload: prompts turned into request specs.

pub mod prompts;

pub use prompts::{load_prompts, parse_jsonl, parse_sharegpt, Prompt, WorkloadError};

use crate::config::SamplingConfig;
use crate::inference::{RequestSpec, SamplingParams};

/// One spec per prompt. A prompt's own `max_tokens` overrides the sampling default.
pub fn build_specs(
    prompts: &[Prompt],
    sampling: &SamplingConfig,
    model: Option<&str>,
) -> Vec<RequestSpec> {
    let base = SamplingParams::from(sampling);
    prompts
        .iter()
        .map(|p| {
            let mut params = base.clone();
            if let Some(max_tokens) = p.max_tokens {
                params.max_tokens = max_tokens;
            }
            RequestSpec::user_prompt(p.prompt.clone(), params, model.map(str::to_string))
        })
        .collect()
}
