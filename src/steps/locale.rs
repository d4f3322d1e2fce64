// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{
    config::LocaleSettings,
    exec::Cmd,
    materialize::{block::ManagedBlock, template::Substitutions, ConfigTemplate},
    step::{Context, Result},
};

use tracing::info;

pub const LOCALE_GEN: &str = "/etc/locale.gen";
pub const DEFAULT_LOCALE: &str = "/etc/default/locale";

/// System default locale file.
pub fn template(settings: &LocaleSettings) -> ConfigTemplate {
    let language = settings
        .name
        .split('.')
        .next()
        .unwrap_or(settings.name.as_str());

    ConfigTemplate::new(
        DEFAULT_LOCALE,
        include_str!("../../templates/locale/default-locale"),
    )
    .with_substitutions(
        Substitutions::new()
            .with("locale", settings.name.as_str())
            .with("language", language),
    )
}

/// Entry that makes `locale-gen` build the locale.
pub fn gen_block(settings: &LocaleSettings) -> ManagedBlock {
    let charset = settings
        .name
        .split_once('.')
        .map(|(_, charset)| charset)
        .unwrap_or("UTF-8");

    ManagedBlock::new("locale", format!("{} {charset}", settings.name))
}

/// Check if `locale -a` lists a locale.
///
/// Locale names are compared the way glibc normalizes them, e.g.,
/// "en_US.UTF-8" is listed as "en_US.utf8".
pub fn is_generated(ctx: &Context<'_>, name: &str) -> bool {
    let normalize = |name: &str| name.to_ascii_lowercase().replace('-', "");
    let wanted = normalize(name);

    ctx.runner
        .check(&Cmd::new("locale").arg("-a"))
        .map(|output| output.stdout.lines().any(|line| normalize(line.trim()) == wanted))
        .unwrap_or(false)
}

/// Generate locale, and make it the system default.
///
/// # Errors
///
/// - Return [`StepError`](crate::step::StepError) if a file cannot be written
///   or `locale-gen` fails.
pub fn run(settings: &LocaleSettings, ctx: &mut Context<'_>) -> Result<()> {
    let gen = ctx.files.ensure_block(LOCALE_GEN, &gen_block(settings), None)?;
    if gen.changed() || !is_generated(ctx, &settings.name) {
        info!("generate locale {}", settings.name);
        ctx.runner.check(&Cmd::new("locale-gen"))?;
    }

    ctx.files.materialize(&template(settings))?;

    Ok(())
}

pub fn satisfied(settings: &LocaleSettings, ctx: &Context<'_>) -> Option<String> {
    let current = ctx.files.is_current(&template(settings)).unwrap_or(false);
    (current && is_generated(ctx, &settings.name))
        .then(|| format!("locale {} already configured", settings.name))
}
