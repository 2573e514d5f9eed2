//! Command-line driver: read a metadata table, apply the requested cuts and
//! print a JSON summary.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use serde::Serialize;

use inspiral_core::{
    AnalysisParams, AnyTable, CoincInspiralTable, Ifo, JsonTableReader, LigoTimeGps,
};

#[derive(Debug, Parser)]
#[command(name = "readmeta", version, about = "Summarise LIGO metadata tables")]
struct Command {
    /// Trigger files: a path, or a directory plus file-name regex
    #[arg(short = 'x', long = "xmlfile")]
    xmlfile: Option<String>,

    /// Table to read (default: sngl_inspiral)
    #[arg(short = 't', long)]
    table: Option<String>,

    /// Keep only rows whose ifo starts with this regex
    #[arg(long)]
    ifo: Option<String>,

    /// Keep only rows from this time slide
    #[arg(long)]
    slide: Option<i64>,

    /// Keep only coincidences found in exactly these detectors
    #[arg(long, value_delimiter = ',')]
    coinc_ifos: Option<Vec<Ifo>>,

    /// Cluster coincidences over windows of this many seconds
    #[arg(long = "cluster")]
    cluster_window_s: Option<f64>,

    /// JSON file with default analysis parameters
    #[arg(long)]
    config: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Command {
    fn params(&self) -> Result<AnalysisParams, String> {
        let mut params = match &self.config {
            Some(path) => {
                AnalysisParams::from_json_file(path).map_err(|e| format!("{}: {}", path, e))?
            }
            None => AnalysisParams::default(),
        };
        if let Some(table) = &self.table {
            params.table = table.clone();
        }
        if self.ifo.is_some() {
            params.ifo_pattern = self.ifo.clone();
        }
        if self.slide.is_some() {
            params.slide = self.slide;
        }
        if self.coinc_ifos.is_some() {
            params.coinc_ifos = self.coinc_ifos.clone();
        }
        if self.cluster_window_s.is_some() {
            params.cluster_window_s = self.cluster_window_s;
        }
        Ok(params)
    }
}

#[derive(Debug, Serialize)]
struct CoincSummary {
    event_id: i64,
    slide: i64,
    ifos: Vec<Ifo>,
    numifos: usize,
    snrsq: f64,
    end_time: Option<LigoTimeGps>,
}

#[derive(Debug, Serialize)]
struct Summary {
    table: String,
    nevents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    coincidences: Option<Vec<CoincSummary>>,
}

fn summarise(coincs: &CoincInspiralTable) -> Vec<CoincSummary> {
    coincs
        .iter()
        .map(|c| CoincSummary {
            event_id: c.event_id,
            slide: c.slide_number(),
            ifos: c.ifos().collect(),
            numifos: c.numifos(),
            snrsq: c.snrsq,
            end_time: c.reference_end_time(),
        })
        .collect()
}

fn run(
    params: &AnalysisParams,
    pattern: Option<&str>,
) -> Result<Summary, Box<dyn std::error::Error>> {
    let mut table = AnyTable::load(&JsonTableReader, pattern, &params.table)?;
    if let Some(pattern) = &params.ifo_pattern {
        table = table.filter_by_ifo(pattern)?;
    }
    if let Some(slide) = params.slide {
        table = table.filter_by_slide(slide)?;
    }
    info!("{} {} row(s) after cuts", table.row_count(), table.table_type());

    let mut summary = Summary {
        table: table.table_type().to_string(),
        nevents: table.row_count(),
        coincidences: None,
    };
    if !params.wants_coincidences() {
        return Ok(summary);
    }

    let sngls = table.as_sngl_inspiral().ok_or_else(|| {
        format!(
            "coincidences need sngl_inspiral triggers, not {}",
            table.table_type()
        )
    })?;
    let mut coincs = CoincInspiralTable::build(sngls)?;
    if let Some(ifos) = &params.coinc_ifos {
        coincs = coincs.filter_by_ifo_set(ifos);
    }
    if let Some(window) = params.cluster_window_s {
        coincs = coincs.cluster(Duration::try_from_secs_f64(window)?)?;
    }
    summary.coincidences = Some(summarise(&coincs));
    Ok(summary)
}

fn main() -> ExitCode {
    let cmd = Command::parse();

    let level = match cmd.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let params = match cmd.params() {
        Ok(p) => p,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&params, cmd.xmlfile.as_deref()) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use inspiral_core::ClusterError;

    fn parse(args: &[&str]) -> Command {
        Command::try_parse_from(std::iter::once("readmeta").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = std::env::temp_dir().join(format!("readmeta-{}-config", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = dir.join("params.json");
        std::fs::write(
            &config,
            r#"{ "ifo_pattern": "H", "slide": 5, "cluster_window_s": 10.0 }"#,
        )
        .unwrap();
        let config = config.to_str().unwrap();

        let from_file = parse(&["--config", config]).params().unwrap();
        assert_eq!(from_file.ifo_pattern.as_deref(), Some("H"));
        assert_eq!(from_file.cluster_window_s, Some(10.0));

        let params = parse(&["--config", config, "--ifo", "L1", "--cluster", "2.5"])
            .params()
            .unwrap();
        assert_eq!(params.ifo_pattern.as_deref(), Some("L1"));
        assert_eq!(params.cluster_window_s, Some(2.5));
        assert_eq!(params.slide, Some(5));
        assert_eq!(params.table, "sngl_inspiral");
    }

    #[test]
    fn coinc_ifos_split_on_commas() {
        let cmd = parse(&["--coinc-ifos", "H1,L1"]);
        assert_eq!(cmd.coinc_ifos, Some(vec![Ifo::H1, Ifo::L1]));
        assert!(Command::try_parse_from(["readmeta", "--coinc-ifos", "H1,X9"]).is_err());
    }

    #[test]
    fn coincidences_need_sngl_inspiral() {
        let params = parse(&["--table", "process", "--cluster", "5"]).params().unwrap();
        let err = run(&params, None).unwrap_err();
        assert!(err.to_string().contains("sngl_inspiral"), "{}", err);

        // Without a coincidence step any table is fine.
        let summary = run(&parse(&["--table", "process"]).params().unwrap(), None).unwrap();
        assert_eq!(summary.table, "process");
        assert!(summary.coincidences.is_none());
    }

    #[test]
    fn zero_cluster_window_is_rejected() {
        let params = parse(&["--cluster", "0"]).params().unwrap();
        let err = run(&params, None).unwrap_err();
        assert_matches!(
            err.downcast_ref::<ClusterError>(),
            Some(ClusterError::InvalidWindow(_))
        );
    }
}
