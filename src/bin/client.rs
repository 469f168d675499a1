//! FDP 클라이언트 (수신자) - File Distribution Protocol
//!
//! 서버에 메타데이터를 요청하고, 청크를 받아 디스크에 기록
//! 새 데이터가 끊기면 누락 구간을 묶어서 재전송 요청
//!
//! 사용법:
//!   cargo run --release --bin fdp-client -- [OPTIONS]
//!
//! 예시:
//!   # 로컬 서버에서 수신 (서버가 알려준 이름으로 저장)
//!   cargo run --release --bin fdp-client
//!
//!   # 저장 경로 지정
//!   cargo run --release --bin fdp-client -- -s 192.168.1.10:9876 -o received.bin

use std::path::PathBuf;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fdp::{Config, FileReceiver};

/// 클라이언트 설정
struct ClientConfig {
    output_path: Option<PathBuf>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_path: None,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"FDP Client - File Distribution Protocol 클라이언트

서버에서 파일을 받고, 누락 구간만 다시 요청

사용법:
  cargo run --release --bin fdp-client -- [OPTIONS]

옵션:
  -s, --server <ADDR>     서버 메타데이터 주소 (기본: 127.0.0.1:9876)
  -b, --bind <ADDR>       청크 수신 바인드 주소 (기본: 0.0.0.0:8765)
  -o, --output <PATH>     저장 경로 (기본: 서버가 알려준 파일 이름)
  --timeout <MS>          재전송 요청 전 대기 시간 (기본: 200, 지터 추가)
  --max-ranges <N>        요청 한 번에 담는 최대 구간 수 (기본: 62)
  -h, --help              이 도움말 출력

로그 레벨은 RUST_LOG 환경변수로 조정 (기본: info)
"#;

fn parse_args() -> Result<ClientConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = || {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{} 에 값이 필요함", flag))
        };

        match flag {
            "--server" | "-s" => {
                config.config.server_addr =
                    value()?.parse().map_err(|e| format!("--server: {}", e))?
            }
            "--bind" | "-b" => {
                config.config.client_bind =
                    value()?.parse().map_err(|e| format!("--bind: {}", e))?
            }
            "--output" | "-o" => config.output_path = Some(PathBuf::from(value()?)),
            "--timeout" => {
                config.config.request_timeout_ms =
                    value()?.parse().map_err(|e| format!("--timeout: {}", e))?
            }
            "--max-ranges" => {
                config.config.max_ranges_per_request =
                    value()?.parse().map_err(|e| format!("--max-ranges: {}", e))?
            }
            "--help" | "-h" => {
                println!("{}", HELP);
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {}", other)),
        }
        i += 1;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("로깅 설정 실패: {}", e);
    }

    let client_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n\n{}", e, HELP);
            return ExitCode::FAILURE;
        }
    };

    let server_addr = client_config.config.server_addr;
    info!("FDP Client starting...");
    info!("Server address: {}", server_addr);

    let receiver = match FileReceiver::bind(client_config.config).await {
        Ok(receiver) => receiver,
        Err(e) => {
            error!("소켓 바인딩 실패: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Cancelling...");
                cancel.cancel();
            }
        });
    }

    match receiver
        .download(server_addr, client_config.output_path.as_deref(), &cancel)
        .await
    {
        Ok(path) => {
            info!("Data saved to {:?}", path);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("수신 실패: {}", e);
            ExitCode::FAILURE
        }
    }
}
