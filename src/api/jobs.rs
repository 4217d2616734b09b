//! SLURM batch scripts, one per catalog item, for the per-scene processing
//! that consumes the shadow catalog.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::core::params::JobParams;
use crate::error::{Error, Result};
use crate::io::stac::CatalogNode;

pub const DEFAULT_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --nodes=1
#SBATCH --ntasks=1
#SBATCH --cpus-per-task=1
#SBATCH --partition=normal
#SBATCH --time=01:00:00
#SBATCH --job-name={item_id}
#SBATCH --output=%x.out

cd $TMPDIR

input_filename={item_id}.toml

cat <<EOF | tee $input_filename
catalog_url = "{catalog_url}"
item_id = "{item_id}"
EOF
"#;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobReport {
    pub written: usize,
    /// Scripts already present from an earlier run
    pub existing: usize,
    pub submitted: usize,
}

/// Substitute `{name}` placeholders; `{{` and `}}` stand for literal braces.
pub fn render_template(template: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let value = variables.get(&name).ok_or_else(|| Error::MissingArgument {
                    arg: format!("template variable `{name}`"),
                })?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn submit(script: &Path, run_dir: &Path) -> Result<()> {
    let script = fs::canonicalize(script)?;
    let status = Command::new("sbatch").arg(&script).current_dir(run_dir).status()?;
    if !status.success() {
        return Err(Error::External(format!("sbatch {script:?} exited with {status}")));
    }
    Ok(())
}

/// Write `<run_dir>/<item id>.bsh` for every item of `catalog` that has no
/// script yet, submitting each new script when configured to.
pub fn write_job_scripts(catalog: &CatalogNode, params: &JobParams) -> Result<JobReport> {
    let template = match &params.template_path {
        Some(path) => fs::read_to_string(path)?,
        None => DEFAULT_TEMPLATE.to_string(),
    };
    fs::create_dir_all(&params.run_dir)?;

    let mut variables = params.variables.clone();
    variables.insert("catalog_url".into(), params.catalog_url.clone());

    let mut report = JobReport::default();
    for item in catalog.all_items() {
        let script: PathBuf = params.run_dir.join(format!("{}.bsh", item.id));
        if script.is_file() {
            debug!("{:?} exists", script);
            report.existing += 1;
            continue;
        }
        variables.insert("item_id".into(), item.id.clone());
        fs::write(&script, render_template(&template, &variables)?)?;
        report.written += 1;
        if params.submit {
            submit(&script, &params.run_dir)?;
            info!("Submitted {:?}", script);
            report.submitted += 1;
        }
    }
    info!(
        "Job scripts: {} written, {} already present, {} submitted",
        report.written, report.existing, report.submitted
    );
    Ok(report)
}
