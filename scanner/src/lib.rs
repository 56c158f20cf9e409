// bufscan — shader/host buffer layout reconciler
//
// Library root. Phases, leaves first: extraction (`source`, `lexer`,
// `field`, `extract`), resolution, alignment, aggregation and conflict
// detection, orchestrated by `pipeline`.

pub mod aggregate;
pub mod align;
pub mod config;
pub mod conflict;
pub mod decl;
pub mod diag;
pub mod extract;
pub mod field;
pub mod id;
pub mod lexer;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod similarity;
pub mod source;
pub mod types;
