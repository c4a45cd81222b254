use anyhow::Result;

use crate::commands::{CommandReport, load_context};
use crate::sweep::reconcile::scan_options;
use crate::sweep::scanner::scan;
use crate::sweep::util::{CancelFlag, format_local, human_readable_size};

#[derive(Debug, Clone, Default)]
pub struct StagedOptions {
    pub size: bool,
}

pub fn run(opts: &StagedOptions) -> Result<CommandReport> {
    let ctx = load_context()?;
    let mut report = CommandReport::new("staged");
    let staging_root = &ctx.cfg.deletion_location;
    report.detail(format!("staging_root={}", staging_root.display()));

    if !staging_root.exists() {
        report.detail("staging root does not exist yet; nothing staged");
        return Ok(report);
    }

    let tz = ctx.cfg.timezone()?;
    let inventory = scan(
        staging_root,
        None,
        &scan_options(&ctx.cfg, opts.size, CancelFlag::new()),
    )?;
    for unit in &inventory.units {
        let mut line = unit.name.clone();
        if let Some(modified) = unit.modified {
            line.push_str(&format!(" modified=\"{}\"", format_local(modified, tz)));
        }
        if let Some(bytes) = unit.size_bytes {
            line.push_str(&format!(" size=\"{}\"", human_readable_size(bytes)));
        }
        report.detail(line);
    }
    for skip in &inventory.skipped {
        report.detail(format!("skipped {}: {}", skip.name, skip.reason));
    }
    if (opts.size || ctx.cfg.get_size) && !inventory.size_truncated {
        let total: u64 = inventory.units.iter().filter_map(|u| u.size_bytes).sum();
        report.detail(format!("total_size=\"{}\"", human_readable_size(total)));
    }
    report.detail(format!("staged_folders={}", inventory.units.len()));
    report.attach(&inventory)?;
    Ok(report)
}
