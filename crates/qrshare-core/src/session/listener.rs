//! TCP 监听套接字

use crate::error::SetupError;
use log::debug;
use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

/// TCP keep-alive 探测间隔
const KEEPALIVE_TIME: Duration = Duration::from_secs(3 * 60);

const BACKLOG: i32 = 1024;

/// 绑定监听套接字
///
/// 在 Linux 和 macOS 上，已接受的连接继承监听套接字的 keep-alive 设置；
/// Windows 不继承。返回的监听器为非阻塞模式，可以直接交给 axum-server。
pub fn bind(addr: SocketAddr) -> Result<TcpListener, SetupError> {
    open(addr).map_err(|source| SetupError::Bind { addr, source })
}

fn open(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_TIME))?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    let listener: TcpListener = socket.into();
    debug!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_port_in_use() {
        let first = bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let addr = first.local_addr().unwrap();

        let err = bind(addr).unwrap_err();
        assert!(matches!(err, SetupError::Bind { addr: a, .. } if a == addr));
    }

    #[cfg(unix)]
    #[test]
    fn test_accepted_connection_keeps_alive() {
        use socket2::SockRef;
        use std::net::TcpStream;

        let listener = bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        listener.set_nonblocking(false).unwrap();
        let _client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let (accepted, _) = listener.accept().unwrap();
        assert!(SockRef::from(&accepted).keepalive().unwrap());
    }
}
