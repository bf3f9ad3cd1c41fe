//! Argument building for the system `ssh` client.
//!
//! Sessions multiplex over an OpenSSH control master: one `ssh -M` process
//! authenticates (through the bastion when configured) and every later
//! command reuses its control socket.

use std::ffi::OsString;

use camino::Utf8Path;
use shell_escape::unix::escape;

use super::SshConfig;

const CONNECT_TIMEOUT_SECS: u16 = 30;

/// Options describing how to reach one hop, including its proxy chain.
pub(crate) fn hop_options(config: &SshConfig, identity: Option<&Utf8Path>, ssh_bin: &str) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-p"),
        OsString::from(config.port.to_string()),
        OsString::from("-o"),
        OsString::from("BatchMode=yes"),
        OsString::from("-o"),
        OsString::from("StrictHostKeyChecking=no"),
        OsString::from("-o"),
        OsString::from("UserKnownHostsFile=/dev/null"),
        OsString::from("-o"),
        OsString::from(format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}")),
    ];

    if let Some(path) = identity {
        args.push(OsString::from("-i"));
        args.push(OsString::from(path.as_str()));
        args.push(OsString::from("-o"));
        args.push(OsString::from("IdentitiesOnly=yes"));
    }

    if let Some(bastion) = config.bastion.as_deref() {
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ProxyCommand={}",
            jump_command(bastion, identity, ssh_bin)
        )));
    } else if let Some(proxy) = config.http_proxy.as_ref() {
        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ProxyCommand=nc -X connect -x {}:{} %h %p",
            proxy.host, proxy.port
        )));
    }

    args
}

/// Shell command used as `ProxyCommand` to tunnel through `bastion`.
fn jump_command(bastion: &SshConfig, identity: Option<&Utf8Path>, ssh_bin: &str) -> String {
    let mut parts = vec![escape(ssh_bin.into()).into_owned()];
    parts.extend(
        hop_options(bastion, identity, ssh_bin)
            .into_iter()
            .map(|arg| escape(arg.to_string_lossy().into_owned().into()).into_owned()),
    );
    parts.push(String::from("-W"));
    parts.push(String::from("%h:%p"));
    parts.push(escape(bastion.destination().into()).into_owned());
    parts.join(" ")
}

/// Arguments that start a backgrounded control master for `config`.
pub(crate) fn master_args(
    config: &SshConfig,
    identity: Option<&Utf8Path>,
    control_path: &Utf8Path,
    log_path: &Utf8Path,
    ssh_bin: &str,
) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-M"),
        OsString::from("-N"),
        OsString::from("-f"),
        OsString::from("-E"),
        OsString::from(log_path.as_str()),
        OsString::from("-o"),
        OsString::from(format!("ControlPath={control_path}")),
        OsString::from("-o"),
        // Bounded so a master whose exit request never ran still goes away.
        OsString::from("ControlPersist=120"),
    ];
    args.extend(hop_options(config, identity, ssh_bin));
    args.push(OsString::from(config.destination()));
    args
}

/// Arguments that run `command` over an existing control master.
pub(crate) fn command_args(config: &SshConfig, control_path: &Utf8Path, command: &str) -> Vec<OsString> {
    vec![
        OsString::from("-S"),
        OsString::from(control_path.as_str()),
        OsString::from("-o"),
        OsString::from("ControlMaster=no"),
        OsString::from("-o"),
        OsString::from("BatchMode=yes"),
        OsString::from("-p"),
        OsString::from(config.port.to_string()),
        OsString::from(config.destination()),
        OsString::from(command),
    ]
}

/// Arguments that ask the control master to exit.
pub(crate) fn exit_args(config: &SshConfig, control_path: &Utf8Path) -> Vec<OsString> {
    vec![
        OsString::from("-S"),
        OsString::from(control_path.as_str()),
        OsString::from("-O"),
        OsString::from("exit"),
        OsString::from(config.destination()),
    ]
}

/// Remote shell command that writes its stdin to `destination`.
pub(crate) fn write_file_command(destination: &str) -> String {
    format!("cat > {}", escape(destination.into()))
}
