//! # ddl-synth
//!
//! Augments the DDL emitted by an ORM schema generator with deterministic
//! object naming, audit columns, trigger-maintained history tables,
//! translation tables, range partitioning and deferred constraints, for
//! Oracle, PostgreSQL and HSQL.
//!
//! ```no_run
//! use ddl_synth::{synthesize_all, RawStatement, SchemaModel, SynthesisConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SynthesisConfig::load()?;
//! let model = SchemaModel::from_json(&std::fs::read_to_string("model.json")?)?;
//! let statements = vec![RawStatement::new("create table customer (id bigint not null, primary key (id))")?];
//! let output = synthesize_all(config, &model, statements)?;
//! println!("{}", output.render());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dialect;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod ordering;
pub mod script;
pub mod statement;
pub mod synth;
pub mod table_config;

pub use config::SynthesisConfig;
pub use dialect::Dialect;
pub use error::{SynthError, SynthResult};
pub use metadata::SchemaModel;
pub use naming::{NameRegistry, NamingStrategy, ObjectKind};
pub use script::{Script, Statement, Terminator};
pub use statement::{RawStatement, StatementKind, TableDefinition};
pub use synth::{synthesize_all, SynthesisOutput, SynthesisSession};
pub use table_config::{TableConfig, TableConfigRegistry};
