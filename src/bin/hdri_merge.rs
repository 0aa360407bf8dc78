use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{App, Arg, ArgGroup, ArgMatches};
use log::warn;

use lib::{
    pipeline::run_with_budget, InputSource, MergeConfig, MergeError, MergeRequest, MergeResult,
    PreviewRequest,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("HDRI Merge")
        .version("1.0")
        .author("Nathan Vegdahl")
        .about("Merges bracketed LDR exposures into an HDR radiance map")
        .arg(
            Arg::with_name("FILES")
                .help("input image files, in any order")
                .multiple(true)
                .index(1),
        )
        .arg(
            Arg::with_name("input-dir")
                .long("input-dir")
                .value_name("DIR")
                .help("merge every image in DIR, in file name order")
                .takes_value(true),
        )
        .group(
            ArgGroup::with_name("input")
                .args(&["FILES", "input-dir"])
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("PATH")
                .help("radiance map to write (.hdr or .exr)")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("method")
                .short("m")
                .long("method")
                .value_name("METHOD")
                .help("response recovery method: debevec or robertson")
                .takes_value(true)
                .default_value("debevec"),
        )
        .arg(
            Arg::with_name("ev")
                .long("ev")
                .value_name("LIST")
                .help("comma separated EV per image, in input order (t = 2^EV)")
                .takes_value(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::with_name("times")
                .long("times")
                .value_name("LIST")
                .help("comma separated exposure time in seconds per image, in input order")
                .takes_value(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::with_name("align")
                .long("align")
                .help("align the exposures before merging"),
        )
        .arg(
            Arg::with_name("tonemap")
                .long("tonemap")
                .value_name("OPERATOR")
                .help("write a tone mapped preview: reinhard, drago or mantiuk")
                .takes_value(true)
                .requires("ldr-output"),
        )
        .arg(
            Arg::with_name("ldr-output")
                .long("ldr-output")
                .value_name("PATH")
                .help("preview to write (.png or .jpg)")
                .takes_value(true)
                .requires("tonemap"),
        )
        .arg(
            Arg::with_name("gamma")
                .long("gamma")
                .value_name("G")
                .help("preview display gamma")
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("2.2"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON file with calibration, alignment and tone mapping settings")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("normalize-exposure")
                .long("normalize-exposure")
                .help("fold EXIF f-number and ISO into the exposure times"),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("give up if the merge takes longer than this")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("report")
                .long("report")
                .help("print the result as JSON"),
        )
        .get_matches();

    if let Err(e) = try_main(&matches) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn try_main(matches: &ArgMatches) -> Result<(), MergeError> {
    let input = match matches.values_of("FILES") {
        Some(files) => InputSource::Files(files.map(PathBuf::from).collect()),
        None => InputSource::Directory(matches.value_of("input-dir").unwrap_or(".").into()),
    };
    let output = PathBuf::from(matches.value_of("output").unwrap_or_default());

    let mut request = MergeRequest::new(input, output);
    if let Some(path) = matches.value_of("config") {
        request.config = MergeConfig::load(Path::new(path))?;
    }
    request.method = matches.value_of("method").unwrap_or("debevec").parse()?;
    request.exposure_times = matches
        .value_of("times")
        .map(|list| parse_list("--times", list))
        .transpose()?;
    request.ev = matches
        .value_of("ev")
        .map(|list| parse_list("--ev", list))
        .transpose()?;
    request.align = matches.is_present("align");
    request.normalize_exposure = matches.is_present("normalize-exposure");

    if let (Some(operator), Some(path)) = (matches.value_of("tonemap"), matches.value_of("ldr-output")) {
        let gamma = parse_number("--gamma", matches.value_of("gamma").unwrap_or("2.2"))?;
        request.preview = Some(PreviewRequest::new(operator, gamma, path.into())?);
    }

    let budget = match matches.value_of("timeout") {
        Some(secs) => {
            let secs = parse_number("--timeout", secs)?;
            if !(secs.is_finite() && secs > 0.0) {
                return Err(MergeError::InvalidParameter(format!(
                    "--timeout must be positive, got {}",
                    secs
                )));
            }
            Some(Duration::from_secs_f32(secs))
        }
        None => None,
    };

    let result = run_with_budget(&request, budget)?;

    if matches.is_present("report") {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => warn!("Couldn't serialize the report: {}", e),
        }
    } else {
        print_summary(&result);
    }

    Ok(())
}

fn print_summary(result: &MergeResult) {
    println!("{}", result.output.display());
    if let Some(preview) = &result.preview {
        println!("{}", preview.display());
    }
    let times: Vec<String> = result.exposure_times.iter().map(|t| t.to_string()).collect();
    println!("exposure times: {}", times.join(","));
}

fn parse_number(flag: &str, text: &str) -> Result<f32, MergeError> {
    text.trim().parse::<f32>().map_err(|_| {
        MergeError::InvalidParameter(format!("{}: '{}' is not a number", flag, text))
    })
}

fn parse_list(flag: &str, text: &str) -> Result<Vec<f32>, MergeError> {
    text.split(',').map(|item| parse_number(flag, item)).collect()
}
