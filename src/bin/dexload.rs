//! Dynamic Plugin Loading Host
//!
//! This is the entry-point of `dexload`, a command-line host for plugin
//! archives. It reads the optional `dexload.toml` configuration, sets up the
//! private storage layout, and calls into the configured archives.
//!
//! See the documentation of the `dexload` library for details on archives,
//! the module manifest, and the two invocation styles.
//!
//! This CLI is mainly a dispatcher of the operations available in
//! `dexload::app` and `dexload::op::*`. It is a simple clap-based CLI that
//! forwards the arguments to `dexload` and prints the results.

use clap;
use dexload;
use env_logger;
use serde_json;

struct Cli {
    cmd: clap::Command,
}

impl Cli {
    fn new() -> Self {
        let mut cmd;

        cmd = clap::Command::new("dexload")
            .propagate_version(true)
            .subcommand_required(true)
            .about("Dynamic Plugin Loading Host")
            .long_about("Load plugin archives at runtime and call into them")
            .version(clap::crate_version!());

        cmd = cmd.arg(
            clap::Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to the host configuration relative to the working directory")
                .value_parser(clap::builder::ValueParser::os_string())
        );

        cmd = cmd.arg(
            clap::Arg::new("storage-root")
                .long("storage-root")
                .value_name("PATH")
                .help("Directory below which the host keeps its private storage")
        );

        cmd = cmd.subcommand(
            clap::Command::new("run")
                .about("Activate the host and run both invocation styles")
        );

        cmd = cmd.subcommand(
            clap::Command::new("contract")
                .about("Call the configured archive via the shared contract")
        );

        cmd = cmd.subcommand(
            clap::Command::new("invoke")
                .about("Call a module function declared in the manifest")
                .arg(
                    clap::Arg::new("module")
                        .long("module")
                        .value_name("KEY")
                        .help("Manifest key of the module to construct")
                )
                .arg(
                    clap::Arg::new("function")
                        .long("function")
                        .value_name("NAME")
                        .help("Name of the module function to invoke")
                )
        );

        cmd = cmd.subcommand(
            clap::Command::new("manifest")
                .about("Print the parsed module manifest")
                .arg(
                    clap::Arg::new("json")
                        .long("json")
                        .help("Print the table as JSON")
                        .action(clap::ArgAction::SetTrue)
                )
        );

        cmd = cmd.subcommand(
            clap::Command::new("layout")
                .about("Create and print the private storage directories")
        );

        Self {
            cmd: cmd,
        }
    }

    fn app(
        &self,
        m: &clap::ArgMatches,
    ) -> Result<dexload::app::App, u8> {
        // Without an explicit configuration, the defaults are used.
        let config = match m.get_one::<std::ffi::OsString>("config") {
            None => Ok(dexload::config::Config::default()),
            Some(path) => dexload::config::Config::parse_path(std::path::Path::new(path)),
        };

        let mut config = match config {
            Err(e) => {
                eprintln!("Cannot load host configuration: {}", e);
                return Err(1);
            },
            Ok(v) => v,
        };

        if let Some(root) = m.get_one::<String>("storage-root") {
            config = config.with_storage_root(root.clone());
        }

        Ok(dexload::app::App::new(config))
    }

    fn op_run(
        &self,
        m: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let app = self.app(m)?;
        let mut display = dexload::app::Display::new();

        app.on_create(&mut display);
        println!("{}", display.text());

        Ok(())
    }

    fn op_contract(
        &self,
        m: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let app = self.app(m)?;

        match app.run_contract() {
            Err(e) => {
                eprintln!("Cannot invoke contract: {}", e);
                Err(1)
            },
            Ok(v) => {
                println!("{}", v);
                Ok(())
            },
        }
    }

    fn op_invoke(
        &self,
        m: &clap::ArgMatches,
        m_op: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let app = self.app(m)?;
        let module = m_op
            .get_one::<String>("module")
            .map(|v| v.as_str())
            .unwrap_or(app.config().module());
        let function = m_op
            .get_one::<String>("function")
            .map(|v| v.as_str())
            .unwrap_or(app.config().function());

        match app.run_declared_function(module, function) {
            Err(e) => {
                eprintln!("Cannot invoke {}{}: {}", module, function, e);
                Err(1)
            },
            Ok(Some(v)) => {
                println!("{}", v);
                Ok(())
            },
            Ok(None) => {
                Ok(())
            },
        }
    }

    fn op_manifest(
        &self,
        m: &clap::ArgMatches,
        m_op: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let app = self.app(m)?;

        let table = match app.parse_device_info() {
            Err(e) => {
                eprintln!("Cannot parse module manifest: {}", e);
                return Err(1);
            },
            Ok(v) => v,
        };

        if m_op.get_flag("json") {
            match serde_json::to_string_pretty(&table) {
                Err(e) => {
                    eprintln!("Cannot serialize module manifest: {}", e);
                    return Err(1);
                },
                Ok(v) => println!("{}", v),
            }
        } else {
            for entry in table.iter() {
                println!(
                    "{}\t{}\t{}",
                    entry.key,
                    entry.name,
                    entry.args.as_deref().unwrap_or(""),
                );
            }
        }

        Ok(())
    }

    fn op_layout(
        &self,
        m: &clap::ArgMatches,
    ) -> Result<(), u8> {
        let app = self.app(m)?;
        let layout = app.config().layout();

        let dirs = [
            ("jar", layout.jar_dir()),
            ("dex", layout.dex_dir()),
            ("lib", layout.lib_dir()),
        ];

        for (name, dir) in dirs {
            match dir {
                Err(e) => {
                    eprintln!("Cannot set up storage layout: {}", e);
                    return Err(1);
                },
                Ok(v) => println!("{}\t{}", name, v.display()),
            }
        }

        Ok(())
    }

    fn run(mut self) -> Result<(), u8> {
        let (m, r);

        r = self.cmd.try_get_matches_from_mut(
            std::env::args_os(),
        );

        match r {
            Ok(v) => m = v,
            Err(e) => {
                return match e.kind() {
                    clap::error::ErrorKind::DisplayHelp |
                    clap::error::ErrorKind::DisplayVersion => {
                        e.print().expect("Cannot write to STDERR");
                        Ok(())
                    },
                    _ => {
                        e.print().expect("Cannot write to STDERR");
                        Err(2)
                    }
                }
            }
        }

        match m.subcommand() {
            Some(("run", _)) => self.op_run(&m),
            Some(("contract", _)) => self.op_contract(&m),
            Some(("invoke", m_op)) => self.op_invoke(&m, &m_op),
            Some(("manifest", m_op)) => self.op_manifest(&m, &m_op),
            Some(("layout", _)) => self.op_layout(&m),
            _ => std::unreachable!(),
        }
    }
}

fn main() -> std::process::ExitCode {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    match Cli::new().run() {
        Ok(()) => 0.into(),
        Err(v) => v.into(),
    }
}
