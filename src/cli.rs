use clap::Parser;

fn default_config() -> String {
    "ledgerd.conf".into()
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to the KEY=VALUE config file",
        default_value_t = default_config()
    )]
    pub config: String,

    #[arg(short, long, value_name = "PORT", help = "TCP port to listen on (1-65535)")]
    pub port: Option<u16>,

    #[arg(
        short = 't',
        long = "threads",
        value_name = "N",
        help = "Worker pool size (1-256)"
    )]
    pub thread_pool_size: Option<usize>,

    #[arg(long, value_name = "FILE", help = "Path to the tariff rates file")]
    pub tariff_file_path: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        help = "Sandbox root directory for LOAD/SAVE"
    )]
    pub server_data_root_dir: Option<String>,

    #[arg(long, value_name = "LEVEL", help = "DEBUG|INFO|WARN|ERROR|NONE")]
    pub log_level: Option<String>,

    #[arg(long, value_name = "FILE", help = "Log file path (empty = console only)")]
    pub log_file_path: Option<String>,
}
