use anyhow::{Result, bail};
use mailprobe_lib::{VerdictKind, VerificationResult};

use crate::args::Cli;

pub fn write_reports(results: &[VerificationResult], cli: &Cli) -> Result<()> {
    match cli.format.as_str() {
        "human" => write_human(results),
        "json" => write_json(results, cli),
        "ndjson" => write_ndjson(results, cli),
        "csv" => write_csv(results, cli),
        other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
    }
}

pub fn any_invalid(results: &[VerificationResult]) -> bool {
    results.iter().any(|result| !result.is_valid())
}

fn write_human(results: &[VerificationResult]) -> Result<()> {
    for result in results {
        let tag = match result.verdict {
            VerdictKind::Valid => "[OK]     ",
            VerdictKind::Invalid => "[INVALID]",
            _ => "[ERROR]  ",
        };
        println!("{tag} {}", result.detail);
    }
    Ok(())
}

/// `{"results": [...]}` with one detail sentence per input.
#[cfg(feature = "with-serde")]
fn write_json(results: &[VerificationResult], cli: &Cli) -> Result<()> {
    let details: Vec<&str> = results.iter().map(|result| result.detail.as_str()).collect();
    let s = serde_json::to_string_pretty(&serde_json::json!({ "results": details }))?;
    if let Some(path) = &cli.out {
        write_all_atomically(path, s.as_bytes())?;
    } else {
        println!("{s}");
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_json(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=json nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-serde")]
fn write_ndjson(results: &[VerificationResult], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut buf = Vec::new();
        for result in results {
            let line = serde_json::to_string(result)?;
            buf.extend_from_slice(line.as_bytes());
            buf.push(b'\n');
        }
        write_all_atomically(path, &buf)?;
    } else {
        for result in results {
            println!("{}", serde_json::to_string(result)?);
        }
    }
    Ok(())
}

#[cfg(not(feature = "with-serde"))]
fn write_ndjson(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=ndjson nécessite la feature 'with-serde'")
}

#[cfg(feature = "with-csv")]
fn write_csv(results: &[VerificationResult], cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        write_csv_rows(&mut wtr, results)?;
        let data = wtr.into_inner()?;
        write_all_atomically(path, &data)?;
    } else {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        write_csv_rows(&mut wtr, results)?;
        wtr.flush()?;
    }
    Ok(())
}

#[cfg(feature = "with-csv")]
fn write_csv_rows<W: std::io::Write>(
    wtr: &mut csv::Writer<W>,
    results: &[VerificationResult],
) -> Result<()> {
    wtr.write_record(["input", "verdict", "detail"])?;
    for result in results {
        wtr.write_record([
            result.input.as_str(),
            result.verdict.as_str(),
            result.detail.as_str(),
        ])?;
    }
    Ok(())
}

#[cfg(not(feature = "with-csv"))]
fn write_csv(_: &[VerificationResult], _: &Cli) -> Result<()> {
    bail!("format=csv nécessite la feature 'with-csv'")
}

#[cfg(any(feature = "with-serde", feature = "with-csv"))]
fn write_all_atomically(path: &str, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    use anyhow::Context;

    let tmp = format!("{path}.tmp");
    {
        let mut f = std::fs::File::create(&tmp).with_context(|| format!("create {tmp}"))?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("rename {tmp} -> {path}"))?;
    Ok(())
}
