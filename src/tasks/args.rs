//! Turns a [`TaskConfig`] into the proxy binary's command line.

use crate::error::AppError;
use crate::tasks::types::{Mode, TaskConfig};

/// Command line and display url for one spawn of the proxy binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launch {
    pub args: Vec<String>,
    pub url: String,
}

pub fn build(config: &TaskConfig) -> Result<Launch, AppError> {
    if config.local_port == 0 {
        return Err(AppError::InvalidConfig("local port must be set".into()));
    }

    let (mut args, url) = match config.mode {
        Mode::Portmap => portmap(config)?,
        Mode::Proxy => proxy(config)?,
    };

    if config.debug {
        args.push("-D".into());
    }
    if let Some(interface) = present(&config.interface) {
        args.push("-I".into());
        args.push(interface.to_string());
    }

    Ok(Launch { args, url })
}

fn portmap(config: &TaskConfig) -> Result<(Vec<String>, String), AppError> {
    let (Some(target_addr), Some(target_port)) =
        (present(&config.target_addr), config.target_port.filter(|p| *p != 0))
    else {
        return Err(AppError::InvalidConfig(
            "port mapping needs both a target address and a target port".into(),
        ));
    };

    let args = vec![
        "-L".to_string(),
        format!(
            "tcp://:{}/{}:{}",
            config.local_port, target_addr, target_port
        ),
    ];
    Ok((args, format!("tcp://localhost:{}", config.local_port)))
}

fn proxy(config: &TaskConfig) -> Result<(Vec<String>, String), AppError> {
    let proto = config.local_proto.trim();
    if proto.is_empty() {
        return Err(AppError::InvalidConfig("local protocol must be set".into()));
    }

    let mut args = vec![
        "-L".to_string(),
        format!("{}:{}", listen_prefix(proto), config.local_port),
    ];

    if let (Some(remote_proto), Some(remote_addr), Some(remote_port)) = (
        present(&config.remote_proto),
        present(&config.remote_addr),
        config.remote_port.filter(|p| *p != 0),
    ) {
        args.push("-F".into());
        args.push(format!(
            "{}{}:{}",
            forward_prefix(remote_proto),
            remote_addr,
            remote_port
        ));
    }

    Ok((args, format!("{}://localhost:{}", proto, config.local_port)))
}

/// `http` and `https` listeners take a scheme separator; others are bare.
fn listen_prefix(proto: &str) -> String {
    match proto {
        "http" | "https" => format!("{proto}://"),
        other => other.to_string(),
    }
}

/// A chain node always needs `scheme://` in front of its host.
fn forward_prefix(proto: &str) -> String {
    format!("{proto}://")
}

/// Form fields come in as empty strings when left blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_config(proto: &str, port: u16) -> TaskConfig {
        TaskConfig {
            local_proto: proto.into(),
            local_port: port,
            ..TaskConfig::default()
        }
    }

    fn forward_count(launch: &Launch) -> usize {
        launch.args.iter().filter(|a| *a == "-F").count()
    }

    #[test]
    fn direct_http_proxy() {
        let launch = build(&proxy_config("http", 8080)).unwrap();
        assert_eq!(launch.args, vec!["-L", "http://:8080"]);
        assert_eq!(launch.url, "http://localhost:8080");
        assert_eq!(forward_count(&launch), 0);
    }

    #[test]
    fn non_http_listener_is_bare() {
        let launch = build(&proxy_config("socks5", 1080)).unwrap();
        assert_eq!(launch.args, vec!["-L", "socks5:1080"]);
        assert_eq!(launch.url, "socks5://localhost:1080");
    }

    #[test]
    fn complete_remote_adds_one_forward() {
        let config = TaskConfig {
            remote_proto: Some("https".into()),
            remote_addr: Some("proxy.example.com".into()),
            remote_port: Some(443),
            ..proxy_config("http", 8080)
        };
        let launch = build(&config).unwrap();
        assert_eq!(forward_count(&launch), 1);
        assert_eq!(
            launch.args,
            vec!["-L", "http://:8080", "-F", "https://proxy.example.com:443"]
        );
    }

    #[test]
    fn socks_remote_keeps_scheme_separator() {
        // Unlike the bare `socks5:1080` listener, the chain node needs `://`.
        let config = TaskConfig {
            remote_proto: Some("socks5".into()),
            remote_addr: Some("10.0.0.1".into()),
            remote_port: Some(1080),
            ..proxy_config("socks5", 1081)
        };
        let launch = build(&config).unwrap();
        assert_eq!(
            launch.args,
            vec!["-L", "socks5:1081", "-F", "socks5://10.0.0.1:1080"]
        );
    }

    #[test]
    fn partial_remote_adds_no_forward() {
        let partials = [
            (None, Some("10.0.0.1"), Some(1080)),
            (Some("socks5"), None, Some(1080)),
            (Some("socks5"), Some("10.0.0.1"), None),
            (Some("socks5"), Some(""), Some(1080)),
        ];
        for (proto, addr, port) in partials {
            let config = TaskConfig {
                remote_proto: proto.map(String::from),
                remote_addr: addr.map(String::from),
                remote_port: port,
                ..proxy_config("http", 8080)
            };
            assert_eq!(forward_count(&build(&config).unwrap()), 0, "{config:?}");
        }
    }

    #[test]
    fn portmap_with_target() {
        let config = TaskConfig {
            mode: Mode::Portmap,
            local_port: 9000,
            target_addr: Some("10.0.0.5".into()),
            target_port: Some(22),
            ..TaskConfig::default()
        };
        let launch = build(&config).unwrap();
        assert_eq!(launch.args, vec!["-L", "tcp://:9000/10.0.0.5:22"]);
        assert_eq!(launch.url, "tcp://localhost:9000");
    }

    #[test]
    fn portmap_without_target_is_rejected() {
        let missing = [(None, None), (Some("10.0.0.5"), None), (None, Some(22)), (Some(" "), Some(22))];
        for (addr, port) in missing {
            let config = TaskConfig {
                mode: Mode::Portmap,
                local_port: 9000,
                target_addr: addr.map(String::from),
                target_port: port,
                ..TaskConfig::default()
            };
            assert!(matches!(build(&config), Err(AppError::InvalidConfig(_))));
        }
    }

    #[test]
    fn debug_and_interface_flags_follow_mode_args() {
        let config = TaskConfig {
            debug: true,
            interface: Some("192.168.1.10".into()),
            ..proxy_config("http", 3128)
        };
        let launch = build(&config).unwrap();
        assert_eq!(
            launch.args,
            vec!["-L", "http://:3128", "-D", "-I", "192.168.1.10"]
        );
    }

    #[test]
    fn zero_port_and_blank_protocol_are_rejected() {
        assert!(build(&proxy_config("http", 0)).is_err());
        assert!(build(&proxy_config("  ", 8080)).is_err());
    }

    #[test]
    fn same_config_same_launch() {
        let config = TaskConfig {
            remote_proto: Some("socks5".into()),
            remote_addr: Some("10.1.1.1".into()),
            remote_port: Some(1080),
            ..proxy_config("socks5", 1081)
        };
        assert_eq!(build(&config).unwrap(), build(&config).unwrap());
    }
}
