use clap::Parser;

/// End-to-end smoke test of an NFV orchestrator Northbound Interface
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Complete server URL, without a trailing slash
    #[arg(long, default_value = "https://localhost:9999/osm")]
    pub url: String,

    #[arg(short, long, default_value = "admin")]
    pub user: String,

    #[arg(short, long, default_value = "admin")]
    pub password: String,

    #[arg(long, default_value = "admin")]
    pub project: String,

    /// Print debug information, can be used several times
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Do not verify the server TLS certificate
    #[arg(long)]
    pub insecure: bool,

    /// Give up on a request after this many seconds. Waits forever if unset
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Run the tests of a TOML plan instead of the built-in NBI scenario
    #[arg(long)]
    pub plan: Option<String>,

    /// VNF descriptor uploaded as text
    #[arg(long, default_value = "./cirros_vnf/cirros_vnfd.yaml")]
    pub vnfd_file: String,

    /// VNF package archive uploaded as binary
    #[arg(long, default_value = "./temp/cirros_vnf.tar.gz")]
    pub vnfd_package: String,

    /// NS descriptor uploaded as text
    #[arg(long, default_value = "./cirros_ns/cirros_nsd.yaml")]
    pub nsd_file: String,

    /// NS package archive uploaded as binary
    #[arg(long, default_value = "./temp/cirros_ns.tar.gz")]
    pub nsd_package: String,
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use crate::cli::Cli;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["nbi-smoke"]).unwrap();

        assert_eq!(cli.url, "https://localhost:9999/osm");
        assert_eq!(cli.user, "admin");
        assert_eq!(cli.verbose, 0);
        assert!(!cli.insecure);
        assert_eq!(cli.timeout, None);
        assert_eq!(cli.plan, None);
    }

    #[test]
    fn repeated_verbose_and_overrides() {
        let cli = Cli::try_parse_from([
            "nbi-smoke",
            "-vv",
            "--url",
            "http://nbi:9999/osm",
            "-u",
            "tester",
            "--insecure",
            "--timeout",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.url, "http://nbi:9999/osm");
        assert_eq!(cli.user, "tester");
        assert!(cli.insecure);
        assert_eq!(cli.timeout, Some(30));
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["nbi-smoke", "-q", "-v"]).is_err());
    }
}
