#![forbid(unsafe_code)]

//! statelog demo binary entry point.

use statelog_core::{Registry, StatelogConfig, TrackOptions, logging};
use statelog_dashboard::{Dashboard, DashboardConfig, JsonFileStore};
use statelog_demo::app::App;
use statelog_demo::{cli, script, terminal};

fn main() {
    let opts = cli::Opts::parse();
    let config = StatelogConfig::from_env();
    let _ = logging::init(&config);
    let options = TrackOptions::from_config(&config);

    let result = if opts.script {
        let stdout = std::io::stdout();
        script::run(opts.width, options, &mut stdout.lock())
    } else {
        let registry = Registry::global();
        let dashboard = Dashboard::new(
            registry.clone(),
            JsonFileStore::new(&opts.state_file),
            DashboardConfig::default().with_version(cli::VERSION),
        );
        let mut app = App::new(registry, options, dashboard);
        terminal::run(&mut app, opts.width)
    };

    if let Err(err) = result {
        eprintln!("statelog-demo: {err}");
        std::process::exit(1);
    }
}
