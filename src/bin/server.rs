//! FDP 서버 (송신자) - File Distribution Protocol
//!
//! 파일 메타데이터를 알려주고, 클라이언트가 요청한 구간을 청크 단위로 전송
//!
//! 사용법:
//!   cargo run --release --bin fdp-server -- --file <PATH> [OPTIONS]
//!
//! 예시:
//!   # 로컬 클라이언트에게 전송
//!   cargo run --release --bin fdp-server -- --file data.bin
//!
//!   # 브로드캐스트 + 시작하자마자 전체 전송
//!   cargo run --release --bin fdp-server -- -f data.bin --broadcast 8765 --announce

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fdp::{Config, FileSender};

/// 서버 설정
struct ServerConfig {
    file_path: Option<PathBuf>,
    config: Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            file_path: None,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"FDP Server - File Distribution Protocol 서버

파일 메타데이터 응답 + 요청된 구간 청크 전송

사용법:
  cargo run --release --bin fdp-server -- --file <PATH> [OPTIONS]

옵션:
  -f, --file <PATH>         전송할 파일 경로 (필수)
  --info <ADDR>             메타데이터 요청 바인드 주소 (기본: 0.0.0.0:9876)
  --requests <ADDR>         재전송 요청 바인드 주소 (기본: 0.0.0.0:11000)
  -d, --data <ADDR>         청크 전송 대상 주소 (기본: 127.0.0.1:8765)
  --broadcast <PORT>        255.255.255.255:<PORT> 로 브로드캐스트
  --chunk-size <SIZE>       청크 크기 바이트 (기본: 1000)
  -w, --workers <N>         송신 워커 수 (기본: 2)
  --interval <US>           워커별 청크 전송 간격 마이크로초 (기본: 0)
  -a, --announce            시작하자마자 파일 전체 전송
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG 환경변수로 조정 (기본: info)
"#;

fn parse_args() -> Result<ServerConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

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
            "--file" | "-f" => config.file_path = Some(PathBuf::from(value()?)),
            "--info" => {
                config.config.info_bind = value()?.parse().map_err(|e| format!("--info: {}", e))?
            }
            "--requests" => {
                config.config.request_bind =
                    value()?.parse().map_err(|e| format!("--requests: {}", e))?
            }
            "--data" | "-d" => {
                config.config.data_addr = value()?.parse().map_err(|e| format!("--data: {}", e))?
            }
            "--broadcast" => {
                let port: u16 = value()?.parse().map_err(|e| format!("--broadcast: {}", e))?;
                config.config.data_addr = Config::broadcast(port).data_addr;
            }
            "--chunk-size" => {
                config.config.chunk_size =
                    value()?.parse().map_err(|e| format!("--chunk-size: {}", e))?
            }
            "--workers" | "-w" => {
                config.config.sender_workers =
                    value()?.parse().map_err(|e| format!("--workers: {}", e))?
            }
            "--interval" => {
                config.config.chunk_interval_us =
                    value()?.parse().map_err(|e| format!("--interval: {}", e))?
            }
            "--announce" | "-a" => config.config.announce_on_start = true,
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

    let server_config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}\n\n{}", e, HELP);
            return ExitCode::FAILURE;
        }
    };
    let Some(path) = server_config.file_path else {
        eprintln!("--file 이 필요함\n\n{}", HELP);
        return ExitCode::FAILURE;
    };

    info!("FDP Server starting...");
    info!("Chunk size: {} bytes", server_config.config.chunk_size);
    info!("Workers: {}", server_config.config.sender_workers);

    let sender = match FileSender::bind(&path, server_config.config).await {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            error!("서버 시작 실패 ({:?}): {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                cancel.cancel();
            }
        });
    }

    match sender.run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("서버 에러: {}", e);
            ExitCode::FAILURE
        }
    }
}
