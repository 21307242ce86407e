//! Fallback printer — the attended, degraded path.
//!
//! When the broker path is unavailable for any reason, the rendered HTML
//! receipt is written under the subsystem's receipts directory with a
//! print-on-load script injected, and opened with the host's default
//! handler so the native print dialog appears. This path always attempts;
//! it is not silent to the operator.

use std::fs;
use std::path::PathBuf;

use tracing::info;
use uuid::Uuid;

use crate::error::{PrintError, PrintResult};

/// Directory name under the data dir where receipt files are written.
const RECEIPTS_DIR: &str = "receipts";

const PRINT_ON_LOAD: &str =
    "<script>window.addEventListener('load',function(){window.print();});</script>";

/// Opens the OS print dialog against a rendered receipt.
pub trait FallbackPrinter: Send + Sync {
    fn open_dialog(&self, html: &str) -> PrintResult<()>;
}

/// Default implementation writing to disk and opening the file.
pub struct DialogFallback {
    receipts_dir: PathBuf,
}

impl DialogFallback {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            receipts_dir: data_dir.join(RECEIPTS_DIR),
        }
    }
}

/// Inject the print-on-load script into a rendered document.
fn with_print_script(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + PRINT_ON_LOAD.len());
            out.push_str(&html[..pos]);
            out.push_str(PRINT_ON_LOAD);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{PRINT_ON_LOAD}"),
    }
}

impl FallbackPrinter for DialogFallback {
    fn open_dialog(&self, html: &str) -> PrintResult<()> {
        fs::create_dir_all(&self.receipts_dir)
            .map_err(|e| PrintError::Dispatch(format!("create receipts dir: {e}")))?;

        let path = self
            .receipts_dir
            .join(format!("receipt-{}.html", Uuid::new_v4()));
        fs::write(&path, with_print_script(html))
            .map_err(|e| PrintError::Dispatch(format!("write receipt file: {e}")))?;

        webbrowser::open(&format!("file://{}", path.display()))
            .map_err(|e| PrintError::Dispatch(format!("open print dialog: {e}")))?;

        info!(path = %path.display(), "opened fallback print dialog");
        Ok(())
    }
}
