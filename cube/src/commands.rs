use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context as _};
use chrono::Local;
use console::{style, Term};
use dialoguer::Confirm;
use sysinfo::System;
use tabular::{row, Table};
use tracing::{debug, info};

use kubecube::history::History;
use kubecube::list::{list_clusters, parse_context};
use kubecube::port::TcpProbe;
use kubecube::ssh::{is_forwarding_process, port_forwarding_cmd};
use kubecube::{
    merge, purge, Downloader, Error, KubeConfig, MergeOptions, PortSource, PurgeOptions, Purged,
    RemoteAddr, ScpFetcher, Settings,
};

use crate::{AddArgs, DelArgs, ForwardArgs, HistoryArgs, ListArgs};

enum EditResult<T> {
    Keep(T),
    Remove(T),
}

/// `config` -> `config_20240101T120000`
fn backup_path(path: &Path) -> PathBuf {
    let now = Local::now().format("%Y%m%dT%H%M%S");
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    path.with_file_name(format!("{name}_{now}"))
}

fn save(settings: &Settings, kc: &KubeConfig, backup: bool) -> anyhow::Result<()> {
    let path = &settings.kubeconfig;

    if backup && path.is_file() {
        let current_backup = backup_path(path);
        fs::copy(path, &current_backup)
            .with_context(|| format!("backing up {}", path.display()))?;
        info!("previous kubeconfig kept at {}", current_backup.display());
    }

    kc.persist(path)?;
    Ok(())
}

pub fn add(settings: &Settings, args: AddArgs) -> anyhow::Result<()> {
    let remote = RemoteAddr::new(&args.remote_user, &args.remote_ip)?;
    let opts = MergeOptions {
        name_suffix: args.name_suffix,
        local_port: args.local_port,
        force: args.force,
    };
    opts.validate()?;
    settings.ensure_dirs()?;

    let mut kc = KubeConfig::load(&settings.kubeconfig)?;

    let fetcher = ScpFetcher;
    let staged = Downloader::new(settings, &fetcher)
        .download(&remote)
        .with_context(|| format!("fetching kubeconfig from {remote}"))?;

    let ports = PortSource {
        range: settings.ports.clone(),
        probe: &TcpProbe,
    };
    let merged = merge(&mut kc, staged, &opts, &ports)?;

    let ssh_cmd = port_forwarding_cmd(
        merged.local_port,
        &merged.remote_api_addr,
        settings.ssh_via.as_deref(),
    );
    if args.print_ssh_forwarding {
        println!("# ssh forwarding command\n{ssh_cmd}");
        return Ok(());
    }

    // always output updated kubeconfig
    println!("# updated config\n{}", kc.serialize()?);
    println!("# ssh forwarding command\n{ssh_cmd}");

    if !args.dry_run {
        save(settings, &kc, args.backup)?;
    }

    Ok(())
}

fn confirm_all(candidates: &[String]) -> anyhow::Result<bool> {
    if !Term::stderr().is_term() {
        return Ok(false);
    }

    eprintln!("{}", style("Multiple contexts match:").yellow());
    for name in candidates {
        eprintln!("  {name}");
    }

    let answer = Confirm::new()
        .with_prompt(format!("Delete all {}?", candidates.len()))
        .wait_for_newline(true)
        .interact()?;
    Ok(answer)
}

fn print_purged(before: &KubeConfig, purged: &[Purged]) {
    let context_ops = before.contexts.iter().map(|(name, ctx)| {
        if purged.iter().any(|p| &p.context == name) {
            EditResult::Remove((name, ctx))
        } else {
            EditResult::Keep((name, ctx))
        }
    });

    println!("# cluster deleted");
    let mut table = Table::new("{:<} {:<} {:<} {:<}");
    for context_op in context_ops {
        let (sym, name, cluster, user) = match context_op {
            EditResult::Keep((name, ctx)) => (' ', name, &ctx.cluster, &ctx.user),
            EditResult::Remove((name, ctx)) => ('-', name, &ctx.cluster, &ctx.user),
        };
        table.add_row(row!(
            sym,
            name,
            format!("🖥  {cluster}"),
            format!("🧑 {user}")
        ));
    }
    for line in table.to_string().lines() {
        if line.starts_with('-') {
            println!("{}", style(line).red())
        } else {
            println!("{line}")
        };
    }
}

pub fn del(settings: &Settings, args: DelArgs) -> anyhow::Result<()> {
    let mut kc = KubeConfig::load(&settings.kubeconfig)?;
    let before = kc.clone();

    let mut opts = PurgeOptions {
        name: args.name,
        all: args.all,
    };
    let purged = match purge(&mut kc, &opts) {
        Ok(purged) => purged,
        Err(Error::MultipleClustersFound(candidates)) if confirm_all(&candidates)? => {
            opts.all = true;
            purge(&mut kc, &opts)?
        }
        Err(err) => return Err(err.into()),
    };

    // always output updated kubeconfig
    println!("# updated config\n{}", kc.serialize()?);

    if !args.dry_run {
        save(settings, &kc, args.backup)?;
    }

    print_purged(&before, &purged);
    Ok(())
}

pub fn list(settings: &Settings, args: ListArgs) -> anyhow::Result<()> {
    let kc = KubeConfig::load(&settings.kubeconfig)?;
    let pattern = args.filter.as_deref().map(str::trim).unwrap_or_default();

    let selected: Vec<_> = list_clusters(&kc, settings.ssh_via.as_deref())
        .into_iter()
        .filter(|info| info.name.contains(pattern))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    let mut table = Table::new("{:<}  {:<}");
    for info in &selected {
        table.add_row(row!(&info.name, &info.ssh_forward));
    }
    print!("{table}");
    Ok(())
}

/// Local clusters that never need a tunnel.
fn not_local(name: &str) -> bool {
    !(name.contains("kind") || name.contains("minikube"))
}

fn start_forwarding(forward_cmd: &str) -> anyhow::Result<()> {
    let mut parts = forward_cmd.split_whitespace();
    let program = parts.next().unwrap_or("ssh");
    debug!(command = %forward_cmd, "starting port forwarding");

    let status = Command::new(program)
        .args(parts)
        .status()
        .with_context(|| format!("running {program}"))?;
    if !status.success() {
        bail!("forward: ssh exited with {status}");
    }
    Ok(())
}

/// Kill every process running `forward_cmd`. Returns how many were found.
fn stop_forwarding(forward_cmd: &str) -> anyhow::Result<usize> {
    let sys = System::new_all();

    let mut found = 0;
    for (pid, process) in sys.processes() {
        if !is_forwarding_process(&process.cmd().join(" "), forward_cmd) {
            continue;
        }

        found += 1;
        debug!(%pid, "killing port forwarding");
        if !process.kill() {
            bail!("forward: failed to kill process {pid}");
        }
    }
    Ok(found)
}

pub fn forward(settings: &Settings, args: ForwardArgs) -> anyhow::Result<()> {
    if args.name.trim().is_empty() {
        bail!("forward: empty cluster name");
    }

    let via = settings.ssh_via.as_deref().filter(|via| !via.trim().is_empty());
    if (args.run || args.stop) && via.is_none() {
        bail!("forward: SSH_VIA env not set, pass --ssh-via");
    }

    let kc = KubeConfig::load(&settings.kubeconfig)?;
    let contexts = kc.find_contexts_by_name(&args.name, Some(&not_local));
    if contexts.is_empty() {
        bail!("forward: cluster not found");
    }
    if args.run && contexts.len() > 1 {
        bail!(
            "forward: multiple clusters found: {:?}",
            contexts.keys().collect::<Vec<_>>()
        );
    }

    for ctx in contexts.keys() {
        let info = parse_context(&kc, ctx, via)
            .with_context(|| format!("context {ctx} is not a merged cluster"))?;
        println!("# context - {ctx}");

        if args.run {
            println!("# {}", info.ssh_forward);
            start_forwarding(&info.ssh_forward)?;
            println!("start ssh local port forwarding successfully.");
        } else if args.stop {
            println!("# {}", info.ssh_forward);
            match stop_forwarding(&info.ssh_forward)? {
                0 => println!("process not found"),
                _ => println!("stop ssh local port forwarding successfully."),
            }
        } else {
            println!("{}", info.ssh_forward);
        }
    }

    Ok(())
}

pub fn show(settings: &Settings) -> anyhow::Result<()> {
    let path = &settings.kubeconfig;
    if !path.exists() {
        println!("config path not exits - {}", path.display());
        return Ok(());
    }
    if path.is_dir() {
        bail!(Error::NotAFile(path.clone()));
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    println!("{content}");
    Ok(())
}

pub fn history(settings: &Settings, args: HistoryArgs) -> anyhow::Result<()> {
    let history = History::new(&settings.history);

    if let Some(from) = args.delete_from {
        history.delete_from(from)?;
        return Ok(());
    }

    for record in history.records()? {
        println!("{}", record.line);
    }
    Ok(())
}
