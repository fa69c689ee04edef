use serde::{Deserialize, Serialize};

/// Hit counts for one byte range of a script, in the profiler's own shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    pub start_offset: u32,
    pub end_offset: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    pub function_name: String,
    pub ranges: Vec<CoverageRange>,
    pub is_block_coverage: bool,
}

/// Coverage for one source unit, keyed by its URL as the profiler saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    pub script_id: String,
    pub url: String,
    pub functions: Vec<FunctionCoverage>,
}

impl ScriptCoverage {
    /// Convenience constructor for sources with a single fully-covered body.
    pub fn whole_script(script_id: impl Into<String>, url: impl Into<String>, count: u64) -> Self {
        Self {
            script_id: script_id.into(),
            url: url.into(),
            functions: vec![FunctionCoverage {
                function_name: String::new(),
                ranges: vec![CoverageRange {
                    start_offset: 0,
                    end_offset: 0,
                    count,
                }],
                is_block_coverage: true,
            }],
        }
    }
}

/// One `take` worth of samples. Ephemeral: handed to the caller and not
/// retained by the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub result: Vec<ScriptCoverage>,
}

impl CoverageReport {
    pub fn new(result: Vec<ScriptCoverage>) -> Self {
        Self { result }
    }

    pub fn len(&self) -> usize {
        self.result.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.result.iter().map(|script| script.url.as_str())
    }
}
