pub mod auto_approval;
pub mod delegation_rules;
pub mod escalation;
pub mod resolution;
