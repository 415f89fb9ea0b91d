use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct ProcessFiles {
    pub command: String,
    pub paths: Vec<PathBuf>,
}

pub fn run(directory_path: impl AsRef<Path>) -> Result<Vec<ProcessFiles>, Error> {
    let result = Command::new("lsof")
        .arg("-V") // report what could not be found
        .arg("-x") // controls handling of cross-over processing for symlinks and mounts
        .arg("f") // follow volume mounts (but not symlinks)
        .arg("+D") // and do it for the entire subtree under `directory_path`
        .arg(directory_path.as_ref()) // search recursively
        .arg("-F") // controls output format
        .arg("cn") // fetch command and name
        .output()
        .context("Failed to list opened files")?;
    // ignoring exit code, as lsof returns 1 if no open files are found for any
    // file in the subtree that is searched
    parse_lsof_output(&String::from_utf8_lossy(&result.stdout))
}

fn parse_lsof_output(output: &str) -> Result<Vec<ProcessFiles>, Error> {
    let mut processes = Vec::new();
    let mut process: Option<ProcessFiles> = None;
    for line in output.lines() {
        if line.starts_with('c') {
            if let Some(process) = process {
                processes.push(process);
            }
            process = Some(ProcessFiles {
                command: line.strip_prefix('c').unwrap().into(),
                paths: Vec::new(),
            });
        } else if line.starts_with('n') {
            process
                .as_mut()
                .context("missing process name")?
                .paths
                .push(PathBuf::from(line.strip_prefix('n').unwrap()));
        }
    }
    if let Some(process) = process {
        processes.push(process);
    }
    Ok(processes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsof_output() {
        let output = indoc::indoc!(
            r#"
            p228
            csystemd-journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            p414
            cjournalctl
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system@312132282b034b13bf33633d64e625ea-000000000000214d-00060d1de2c9294c.journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system@312132282b034b13bf33633d64e625ea-000000000000214d-00060d1de2c9294c.journal
            p9156
            ctrident
            n/var/lib/trident/tmp-datastore.sqlite
            "#
        );
        let expected_process_files_list = vec![
            ProcessFiles {
                command: "systemd-journal".into(),
                paths: vec![
                    PathBuf::from(
                        "/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal",
                    ),
                    PathBuf::from(
                        "/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal",
                    ),
                ],
            },
            ProcessFiles {
                command: "journalctl".into(),
                paths: vec![PathBuf::from(
                    "/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal",
                ),
                PathBuf::from("/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system@312132282b034b13bf33633d64e625ea-000000000000214d-00060d1de2c9294c.journal"),
                PathBuf::from("/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal"),
                PathBuf::from("/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system@312132282b034b13bf33633d64e625ea-000000000000214d-00060d1de2c9294c.journal"),
                ],
            },
            ProcessFiles {
                command: "trident".into(),
                paths: vec![
                    PathBuf::from(
                        "/var/lib/trident/tmp-datastore.sqlite",
                    ),
                ],
            },
        ];
        let process_files_list = parse_lsof_output(output).unwrap();
        assert_eq!(process_files_list, expected_process_files_list);

        assert_eq!(parse_lsof_output("bad output").unwrap(), Vec::new());

        // malformed output, missing process name
        let output = indoc::indoc!(
            r#"
            p228
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            csystemd-journal
            n/var/log/journal/a3355ae88df94601a7029fe157ccbee1/system.journal
            "#
        );
        assert_eq!(
            parse_lsof_output(output)
                .unwrap_err()
                .root_cause()
                .to_string(),
            "missing process name"
        );
    }
}
