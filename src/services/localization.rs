use fluent::{FluentArgs, FluentResource};
use fluent_bundle::bundle::FluentBundle;
use include_dir::{Dir, include_dir};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use unic_langid::LanguageIdentifier;

// We use the concurrent memoizer to ensure thread safety (Sync + Send)
type ConcurrentBundle = FluentBundle<FluentResource, intl_memoizer::concurrent::IntlLangMemoizer>;

// Embed the locales directory at compile time
static LOCALES_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/locales");

const FALLBACK_LOCALE: &str = "en-US";

pub struct LocalizationManager {
    bundles: HashMap<LanguageIdentifier, ConcurrentBundle>,
    default_locale: String,
}

impl LocalizationManager {
    pub fn new(default_locale: &str) -> Self {
        let mut bundles = HashMap::new();

        for entry in LOCALES_DIR.dirs() {
            let locale_name = entry.path().to_string_lossy();

            let Ok(lang_id) = locale_name.parse::<LanguageIdentifier>() else {
                continue;
            };

            let mut bundle = ConcurrentBundle::new_concurrent(vec![lang_id.clone()]);
            // Mentions must reach Discord without bidi isolation marks around them
            bundle.set_use_isolating(false);

            for file in entry.files() {
                if file.path().extension().and_then(|e| e.to_str()) != Some("ftl") {
                    continue;
                }
                let Some(content) = file.contents_utf8() else {
                    continue;
                };

                match FluentResource::try_new(content.to_string()) {
                    Ok(resource) => {
                        if let Err(errors) = bundle.add_resource(resource) {
                            for err in errors {
                                error!("Error adding resource for {}: {:?}", locale_name, err);
                            }
                        }
                    }
                    Err((_, errors)) => {
                        for err in errors {
                            error!("Error parsing resource for {}: {:?}", locale_name, err);
                        }
                    }
                }
            }

            info!("Loaded embedded locale: {}", locale_name);
            bundles.insert(lang_id, bundle);
        }

        Self {
            bundles,
            default_locale: default_locale.to_string(),
        }
    }

    pub fn get_proxy(self: &Arc<Self>, locale: &str) -> L10nProxy {
        L10nProxy {
            manager: self.clone(),
            locale: locale.to_string(),
        }
    }

    fn format(&self, lang_id: &LanguageIdentifier, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundle = self.bundles.get(lang_id)?;
        let pattern = bundle.get_message(key)?.value()?;
        let mut errors = vec![];
        let text = bundle.format_pattern(pattern, args, &mut errors).into_owned();
        if !errors.is_empty() {
            error!("Errors formatting {} for {}: {:?}", key, lang_id, errors);
        }
        Some(text)
    }

    pub fn translate(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        let candidates = [locale, self.default_locale.as_str(), FALLBACK_LOCALE];

        for candidate in candidates {
            if let Ok(lang_id) = candidate.parse::<LanguageIdentifier>() {
                if let Some(text) = self.format(&lang_id, key, args) {
                    return text;
                }
            }
        }

        key.to_string()
    }

    /// Translates into the configured community locale.
    pub fn t(&self, key: &str, args: Option<&FluentArgs>) -> String {
        self.translate(&self.default_locale, key, args)
    }
}

/// A proxy for translation that holds a reference to the manager and a specific locale
pub struct L10nProxy {
    pub manager: Arc<LocalizationManager>,
    pub locale: String,
}

impl L10nProxy {
    pub fn t(&self, key: &str, args: Option<&FluentArgs>) -> String {
        self.manager.translate(&self.locale, key, args)
    }
}

/// Helper trait to add localization to the Poise context
pub trait ContextL10nExt {
    fn l10n_user(&self) -> L10nProxy;
}

impl ContextL10nExt for crate::Context<'_> {
    fn l10n_user(&self) -> L10nProxy {
        let manager = &self.data().l10n;
        let locale = self.locale().unwrap_or(&manager.default_locale);
        manager.get_proxy(locale)
    }
}
