//! `RunInfo.xml`: run identity and expected read cycles.
//!
//! ```xml
//! <RunInfo Version="5">
//!   <Run Id="240101_A01234_0001_BHXXXX" Number="1">
//!     <Reads>
//!       <Read Number="1" NumCycles="151" IsIndexedRead="N" />
//!       <Read Number="2" NumCycles="8" IsIndexedRead="Y" />
//!     </Reads>
//!   </Run>
//! </RunInfo>
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::error::{io_err, CoreError};
use crate::types::RunId;

/// Fixed name of the run metadata file in the run root.
pub const RUN_INFO_FILE: &str = "RunInfo.xml";

#[derive(Debug, Deserialize)]
struct RunInfoDoc {
    #[serde(rename = "Run")]
    run: RunElement,
}

#[derive(Debug, Deserialize)]
struct RunElement {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "Reads", default)]
    reads: Option<ReadsElement>,
}

#[derive(Debug, Deserialize)]
struct ReadsElement {
    #[serde(rename = "Read", default)]
    read: Vec<ReadElement>,
}

#[derive(Debug, Deserialize)]
struct ReadElement {
    #[serde(rename = "@NumCycles")]
    num_cycles: u32,
}

/// Parsed subset of `RunInfo.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: RunId,
    /// `NumCycles` of each `Read`, in document order.
    pub read_cycles: Vec<u32>,
}

impl RunInfo {
    /// Load `<run_dir>/RunInfo.xml`.
    ///
    /// Returns [`CoreError::RunInfoMissing`] if the file is absent and
    /// [`CoreError::RunInfoParse`] if the run id cannot be extracted.
    pub fn load(run_dir: &Path) -> Result<Self, CoreError> {
        let path = run_dir.join(RUN_INFO_FILE);
        if !path.is_file() {
            return Err(CoreError::RunInfoMissing {
                run_dir: run_dir.to_path_buf(),
            });
        }
        let xml = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Self::parse(&xml).map_err(|message| CoreError::RunInfoParse { path, message })
    }

    pub fn parse(xml: &str) -> Result<Self, String> {
        let doc: RunInfoDoc = quick_xml::de::from_str(xml).map_err(|e| e.to_string())?;
        let id = doc.run.id.trim();
        if id.is_empty() {
            return Err("empty Run Id attribute".to_string());
        }
        Ok(Self {
            run_id: RunId::from(id),
            read_cycles: doc
                .run
                .reads
                .map(|r| r.read.into_iter().map(|read| read.num_cycles).collect())
                .unwrap_or_default(),
        })
    }

    /// Total cycles the instrument is expected to write.
    pub fn expected_cycles(&self) -> u32 {
        self.read_cycles.iter().sum()
    }
}
