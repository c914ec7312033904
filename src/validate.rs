use std::fmt;
use std::io::IsTerminal;

use argh::FromArgs;
use exitcode::ExitCode;
use framework::tls::TlsConfig;
use logsidecar_injector::config::{ConfigPaths, InjectorConfig, SAMPLE_PATHS};

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "validate",
    description = "Validate the sidecar config, the active template and certificates, then exit"
)]
pub struct Validate {
    #[argh(switch, description = "skip loading the certificate and private key")]
    no_certs: bool,
}

impl Validate {
    pub fn run(&self, paths: &ConfigPaths, tls: &TlsConfig) -> ExitCode {
        let color = std::io::stdout().is_terminal();

        let mut fmt = Formatter::new(color);
        let mut validated = self.validate_config(paths, &mut fmt);

        if self.no_certs {
            fmt.warning("Certificates are not checked");
        } else {
            validated &= validate_certs(tls, &mut fmt);
        }

        if validated {
            fmt.validated();
            exitcode::OK
        } else {
            exitcode::CONFIG
        }
    }

    fn validate_config(&self, paths: &ConfigPaths, fmt: &mut Formatter) -> bool {
        let config = match InjectorConfig::load(paths) {
            Ok(config) => config,
            Err(err) => {
                fmt.title(format!("Failed to load {:?}", paths.sidecar));
                fmt.sub_error([err]);
                return false;
            }
        };

        let template = paths.template(config.kind);
        fmt.success(format!(
            "Loaded {:?}, sidecar type {}",
            paths.sidecar, config.kind
        ));

        let sample = SAMPLE_PATHS.map(String::from);
        match config.renderer.render(&sample) {
            Ok(_) => {
                fmt.success(format!("Rendered template {template:?}"));
                true
            }
            Err(err) => {
                fmt.title(format!("Failed to render template {template:?}"));
                fmt.sub_error([err]);
                false
            }
        }
    }
}

fn validate_certs(tls: &TlsConfig, fmt: &mut Formatter) -> bool {
    match tls.certified_key() {
        Ok(key) => {
            fmt.success(format!(
                "Loaded {} certificate(s) from {:?}",
                key.cert.len(),
                tls.cert
            ));
            true
        }
        Err(err) => {
            fmt.title("Failed to load certificates");
            fmt.sub_error([err]);
            false
        }
    }
}

struct Formatter {
    /// Width of largest printed line
    max_line_width: usize,
    /// Can empty line be printed
    print_space: bool,
    color: bool,
    // Intros
    error_intro: &'static str,
    warning_intro: &'static str,
    success_intro: &'static str,
}

impl Formatter {
    fn new(color: bool) -> Self {
        Self {
            max_line_width: 0,
            print_space: false,
            error_intro: if color {
                // red
                "\x1b[31mx\x1b[0m"
            } else {
                "x"
            },
            warning_intro: if color {
                // yellow
                "\x1b[33m~\x1b[0m"
            } else {
                "~"
            },
            success_intro: if color {
                // green
                "\x1b[32m√\x1b[0m"
            } else {
                "√"
            },
            color,
        }
    }

    #[allow(clippy::print_stdout)]
    fn validated(&self) {
        println!("{:-^width$}", "", width = self.max_line_width);

        if self.color {
            // escape codes must not count into the width
            println!(
                "{:>width$}",
                "\x1b[32mValidated\x1b[0m",
                width = self.max_line_width + 9
            );
        } else {
            println!("{:>width$}", "Validated", width = self.max_line_width)
        }
    }

    fn success(&mut self, msg: impl AsRef<str>) {
        self.print(format!("{} {}\n", self.success_intro, msg.as_ref()))
    }

    fn warning(&mut self, warning: impl AsRef<str>) {
        self.print(format!("{} {}\n", self.warning_intro, warning.as_ref()))
    }

    fn title(&mut self, title: impl AsRef<str>) {
        self.space();
        self.print(format!(
            "{}\n{:-<width$}\n",
            title.as_ref(),
            "",
            width = title.as_ref().len()
        ))
    }

    fn sub_error<I: IntoIterator>(&mut self, errors: I)
    where
        I::Item: fmt::Display,
    {
        for msg in errors {
            self.print(format!("{} {}\n", self.error_intro, msg));
        }
        self.space();
    }

    fn space(&mut self) {
        if self.print_space {
            self.print_space = false;
            #[allow(clippy::print_stdout)]
            {
                println!();
            }
        }
    }

    fn print(&mut self, print: impl AsRef<str>) {
        let width = print
            .as_ref()
            .lines()
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);
        self.max_line_width = width.max(self.max_line_width);
        self.print_space = true;
        #[allow(clippy::print_stdout)]
        {
            print!("{}", print.as_ref())
        }
    }
}
