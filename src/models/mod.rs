//! Concrete generators shipped with the crate

mod text;
mod tokenizer;

pub use text::{TextGenerator, TextParams};
pub use tokenizer::PromptTokenizer;

use crate::generator::ModelRegistry;

/// Register every built-in generator under its name
pub fn register_builtin(registry: &mut ModelRegistry) {
    registry.register(TextGenerator::NAME, text::build);
}
