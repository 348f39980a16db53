use crate::config::PanelConfig;
use crate::core::FormulaDef;
use crate::error::{ExpressionError, PanelError, PanelResult};
use crate::formula::{classify, parse_formula, split_groups, FormulaKind, Statistic};
use crate::loader::{self, DataSource, LoadedPanel};
use serde::Deserialize;
use serde_yaml::Mapping;
use std::path::{Path, PathBuf};

/// A job file: which data to load, how it is grouped, what to compute.
///
/// ```yaml
/// panel:
///   id_column: Firm
///   time_column: Year
///   null_keys: exclude
/// sources:
///   - file: balance_sheet.csv
///     label: BS
///   - file: income.xlsx
///     label: IS
///     sheet: FY
/// formulas:
///   - name: ROA
///     expression: Income(x) / Assets(x)
///   - name: dROA
///     expression: ROA(x) - ROA(x-1)
///   - name: MeanROA
///     type: mean
///     variable: ROA
///     groups: [Year]
/// output: results.csv
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFile {
    #[serde(default)]
    pub panel: PanelConfig,

    #[serde(default)]
    pub sources: Vec<SourceSpec>,

    /// Inline data, used instead of `sources`
    #[serde(default)]
    pub rows: Vec<Mapping>,

    #[serde(default)]
    pub formulas: Vec<FormulaSpec>,

    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSpec {
    pub file: PathBuf,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub sheet: Option<String>,
}

/// Explicit formula type, overriding detection from the expression text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaType {
    Row,
    Mean,
    Stdev,
}

/// Group columns written as a list or as one comma separated string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GroupList {
    List(Vec<String>),
    Joined(String),
}

impl GroupList {
    fn into_vec(self) -> Vec<String> {
        match self {
            GroupList::List(groups) => groups,
            GroupList::Joined(joined) => split_groups(&joined),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormulaSpec {
    pub name: String,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default, rename = "type")]
    pub formula_type: Option<FormulaType>,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub groups: Option<GroupList>,
}

impl FormulaSpec {
    /// Resolve into a formula definition
    pub fn to_def(&self) -> PanelResult<FormulaDef> {
        let kind = match self.formula_type {
            None => classify(self.expression()?).map_err(|e| self.context(e))?,
            Some(FormulaType::Row) => {
                FormulaKind::Row(parse_formula(self.expression()?).map_err(|e| self.context(e))?)
            }
            Some(FormulaType::Mean) => self.aggregate(Statistic::Mean)?,
            Some(FormulaType::Stdev) => self.aggregate(Statistic::Stdev)?,
        };
        Ok(FormulaDef::new(self.name.clone(), kind))
    }

    fn expression(&self) -> PanelResult<&str> {
        self.expression.as_deref().ok_or_else(|| {
            PanelError::Configuration(format!("formula '{}' has no expression", self.name))
        })
    }

    fn aggregate(&self, statistic: Statistic) -> PanelResult<FormulaKind> {
        let variable = self.variable.clone().ok_or_else(|| {
            PanelError::Configuration(format!(
                "{} formula '{}' needs a variable",
                statistic.name(),
                self.name
            ))
        })?;
        let groups = self.groups.clone().map(GroupList::into_vec).unwrap_or_default();
        if statistic == Statistic::Mean && groups.is_empty() {
            return Err(PanelError::Configuration(format!(
                "mean formula '{}' needs at least one group column",
                self.name
            )));
        }
        Ok(FormulaKind::Aggregate {
            statistic,
            variable,
            groups,
        })
    }

    fn context(&self, error: ExpressionError) -> PanelError {
        PanelError::Parse(format!("formula '{}': {}", self.name, error))
    }
}

/// A parsed job file and the directory its relative paths are resolved against
#[derive(Debug, Clone)]
pub struct Job {
    pub path: PathBuf,
    pub spec: JobFile,
}

impl Job {
    fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    pub fn config(&self) -> &PanelConfig {
        &self.spec.panel
    }

    pub fn data_sources(&self) -> Vec<DataSource> {
        self.spec
            .sources
            .iter()
            .map(|source| {
                let mut data = DataSource::new(self.resolve(&source.file));
                if let Some(label) = &source.label {
                    data.label = label.clone();
                }
                data.sheet = source.sheet.clone();
                data
            })
            .collect()
    }

    /// Load the inline rows, or every source merged on (id, time)
    pub fn load_data(&self) -> PanelResult<LoadedPanel> {
        if self.spec.sources.is_empty() {
            let store = loader::rows_from_mappings(self.spec.rows.clone())?;
            return Ok(LoadedPanel::inline(store));
        }
        loader::load_sources(&self.data_sources(), &self.spec.panel)
    }

    pub fn formulas(&self) -> PanelResult<Vec<FormulaDef>> {
        self.spec.formulas.iter().map(FormulaSpec::to_def).collect()
    }

    /// Output path from the job file, resolved against its directory
    pub fn output_path(&self) -> Option<PathBuf> {
        self.spec.output.as_deref().map(|p| self.resolve(p))
    }
}

/// Parse a job file.
///
/// The file must name its data (`sources` or inline `rows`, not both) and at
/// least one formula. Formula text is parsed here so syntax errors surface
/// before any data is loaded.
pub fn parse_job(path: &Path) -> PanelResult<Job> {
    let content = std::fs::read_to_string(path)?;
    let spec = parse_job_str(&content)?;
    Ok(Job {
        path: path.to_path_buf(),
        spec,
    })
}

pub fn parse_job_str(content: &str) -> PanelResult<JobFile> {
    let spec: JobFile = serde_yaml::from_str(content)?;

    match (spec.sources.is_empty(), spec.rows.is_empty()) {
        (true, true) => {
            return Err(PanelError::Configuration(
                "job has no data: add 'sources' or inline 'rows'".to_string(),
            ))
        }
        (false, false) => {
            return Err(PanelError::Configuration(
                "job has both 'sources' and inline 'rows'; use one".to_string(),
            ))
        }
        _ => {}
    }
    if spec.formulas.is_empty() {
        return Err(PanelError::Configuration("job has no formulas".to_string()));
    }
    for formula in &spec.formulas {
        formula.to_def()?;
    }

    Ok(spec)
}
