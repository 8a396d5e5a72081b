//! Stages 5 and 6: Skill directory assembly and index enhancement
//!
//! The assembler lays out the final on-disk knowledge package; the
//! enhancer replaces the deliberately basic index document with an
//! AI-written one that must pass a quality gate, or not at all.

pub mod assembler;
pub mod enhancer;
pub mod validator;

pub use assembler::{SkillAssembler, SkillDirectory};
pub use enhancer::SkillEnhancer;
pub use validator::{SkillValidator, ValidationReport};
