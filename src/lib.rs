//! panelcalc - row formulas over panel data
//!
//! Rows are grouped by an identifier column (a firm), and formulas reference
//! columns at a relative row offset *within the group*: `Revenue(x-1)` on a
//! firm's first row is blank, never the previous firm's last row. Any blank
//! operand makes the whole result blank.
//!
//! # Features
//!
//! - Group-isolated row offsets (`Column(x)`, `Column(x-1)`, `Column(x+2)`)
//! - Strict null propagation through every operator and function
//! - Chained variables, grouped `mean` and `stdev`
//! - CSV, Excel, YAML and JSON input; multi-source merge on (id, time)
//! - Parallel group evaluation (`parallel` feature)
//!
//! # Example
//!
//! ```
//! use panelcalc::config::PanelConfig;
//! use panelcalc::core::run;
//! use panelcalc::formula::parse_formula;
//! use panelcalc::types::{CellValue, Record, RowStore};
//!
//! let store = RowStore::from_records(
//!     vec!["Firm".to_string(), "Revenue".to_string()],
//!     vec![
//!         Record::new().with("Firm", "A").with("Revenue", 10.0),
//!         Record::new().with("Firm", "B").with("Revenue", 7.0),
//!         Record::new().with("Firm", "A").with("Revenue", 15.0),
//!     ],
//! );
//! let expr = parse_formula("Revenue(x) - Revenue(x-1)")?;
//! let output = run(&store, &PanelConfig::grouped_by("Firm"), &expr)?;
//!
//! assert_eq!(output.value(0), Some(&CellValue::Absent));
//! assert_eq!(output.value(1), Some(&CellValue::Absent));
//! assert_eq!(output.value(2), Some(&CellValue::Number(5.0)));
//! # Ok::<(), panelcalc::error::PanelError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod formula;
pub mod loader;
pub mod parser;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use config::{CalcOptions, NullKeyPolicy, PanelConfig};
pub use error::{ExpressionError, PanelError, PanelResult};
pub use types::{CellValue, Record, RowStore};
