pub mod board;
pub mod llm;
