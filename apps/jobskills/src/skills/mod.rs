// Master skill registry access.
// All registry reads and writes go through SkillResolver.

pub mod resolver;

pub use resolver::SkillResolver;
