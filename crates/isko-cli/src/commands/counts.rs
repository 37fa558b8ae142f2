use isko_core::sync::count_visibility;

use crate::commands::common::{format_counts_lines, open_backend};
use crate::error::CliError;

pub async fn run_counts(as_json: bool) -> Result<(), CliError> {
    let backend = open_backend()?;
    let counts = count_visibility(backend.as_ref()).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        for line in format_counts_lines(&counts) {
            println!("{line}");
        }
    }
    Ok(())
}
