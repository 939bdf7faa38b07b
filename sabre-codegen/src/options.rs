/// Knobs of a code generation session.
#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Deepest expression nesting compiled before giving up.
    pub max_expression_depth: usize,
    /// Upper bound on the number of assembly items of one context.
    pub max_code_size: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            max_expression_depth: 256,
            max_code_size: 24576,
        }
    }
}
