use openwith::config::Config;
use openwith::humanize::ExtensionList;
use openwith::registry::{AppRef, CanonicalType, Category, Snapshot, TypeKey};
use openwith::service::RegistryHandle;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::{AppsArgs, Commands, TypesArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Serialize)]
struct TypeView<'a> {
    key: &'a TypeKey,
    name: &'a str,
    category: Category,
    extensions: Vec<&'a str>,
    default_app: Option<&'a str>,
    supporters: Vec<&'a str>,
}

impl<'a> From<&'a CanonicalType> for TypeView<'a> {
    fn from(ty: &'a CanonicalType) -> Self {
        Self {
            key: &ty.key,
            name: &ty.name,
            category: ty.category,
            extensions: ty.extensions.iter().map(String::as_str).collect(),
            default_app: ty.default_app.as_ref().map(|app| app.identifier.as_str()),
            supporters: ty.supporters.iter().map(|app| app.identifier.as_str()).collect(),
        }
    }
}

#[derive(Serialize)]
struct AppView<'a> {
    identifier: &'a str,
    name: &'a str,
    path: &'a std::path::Path,
    icon: Option<&'a std::path::Path>,
    types: usize,
    defaults: usize,
}

impl<'a> AppView<'a> {
    fn new(app: &'a AppRef, snapshot: &Snapshot) -> Self {
        Self {
            identifier: &app.identifier,
            name: &app.name,
            path: &app.path,
            icon: app.icon.as_ref().map(|icon| icon.path()),
            types: snapshot.types_for_application(&app.identifier).len(),
            defaults: snapshot.default_count(&app.identifier),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AnyError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn app_label(app: Option<&AppRef>) -> String {
    app.map(|app| format!("{} ({})", app.name, app.identifier))
        .unwrap_or_else(|| "none".to_string())
}

pub async fn run(command: Commands, config: &Config, handle: &RegistryHandle) -> Result<(), AnyError> {
    match command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        Commands::Types(args) => types(args, handle).await,
        Commands::Apps(args) => apps(args, handle).await,
        Commands::Show { key, json } => show(&TypeKey::parse(&key), json, handle).await,
        Commands::App { identifier, json } => app(&identifier, json, handle).await,
        Commands::SetDefault { identifier, key } => set_default(&identifier, &TypeKey::parse(&key), handle).await,
        Commands::SetDefaultAll { identifier } => set_default_all(&identifier, handle).await,
        Commands::Refresh { key } => refresh(&TypeKey::parse(&key), handle).await,
        Commands::Resolve { path, json } => resolve(path, json, handle).await,
        Commands::ClearDefault { key } => {
            handle.clear_default(&TypeKey::parse(&key))?;
            Ok(())
        }
    }
}

async fn types(args: TypesArgs, handle: &RegistryHandle) -> Result<(), AnyError> {
    let snapshot = handle.refresh().await?;
    let mut types = match &args.search {
        Some(query) => snapshot.search_types(query),
        None => snapshot.types(),
    };
    if let Some(category) = args.category {
        let category = Category::from(category);
        types.retain(|ty| ty.category == category);
    }

    if args.json {
        let views: Vec<TypeView> = types.into_iter().map(TypeView::from).collect();
        return print_json(&views);
    }

    for ty in &types {
        println!(
            "{:<40} {:<32} {:<24} {}",
            ty.key,
            ty.name,
            ExtensionList(&ty.extensions).to_string(),
            app_label(ty.default_app.as_ref())
        );
    }
    println!(
        "{} types ({} document types) from {} applications",
        types.len(),
        snapshot.document_type_count(),
        snapshot.applications().len()
    );
    Ok(())
}

async fn apps(args: AppsArgs, handle: &RegistryHandle) -> Result<(), AnyError> {
    let snapshot = handle.refresh().await?;
    let apps = snapshot.search_applications(args.search.as_deref().unwrap_or(""));

    if args.json {
        let views: Vec<AppView> = apps.into_iter().map(|app| AppView::new(app, &snapshot)).collect();
        return print_json(&views);
    }

    for app in &apps {
        let view = AppView::new(app, &snapshot);
        println!(
            "{:<40} {:<32} {:>4} types {:>4} defaults",
            view.identifier, view.name, view.types, view.defaults
        );
    }
    Ok(())
}

async fn show(key: &TypeKey, json: bool, handle: &RegistryHandle) -> Result<(), AnyError> {
    let snapshot = handle.refresh().await?;
    let ty = snapshot
        .get(key)
        .ok_or_else(|| format!("unknown type: {key}"))?;
    print_type(ty, json)
}

fn print_type(ty: &CanonicalType, json: bool) -> Result<(), AnyError> {
    if json {
        return print_json(&TypeView::from(ty));
    }

    println!("{} ({})", ty.name, ty.key);
    println!("  category:   {}", ty.category.label());
    if !ty.extensions.is_empty() {
        println!("  extensions: {}", ExtensionList(&ty.extensions));
    }
    println!("  default:    {}", app_label(ty.default_app.as_ref()));
    for app in &ty.supporters {
        let marker = if ty.is_default(&app.identifier) { "*" } else { " " };
        println!("  {marker} {}", app_label(Some(app)));
    }
    Ok(())
}

async fn app(identifier: &str, json: bool, handle: &RegistryHandle) -> Result<(), AnyError> {
    let snapshot = handle.refresh().await?;
    let app = snapshot
        .known_application(identifier)
        .ok_or_else(|| format!("unknown application: {identifier}"))?;
    let types = snapshot.types_for_application(identifier);

    if json {
        #[derive(Serialize)]
        struct Detail<'a> {
            #[serde(flatten)]
            app: AppView<'a>,
            handles: Vec<TypeView<'a>>,
        }
        return print_json(&Detail {
            app: AppView::new(app, &snapshot),
            handles: types.into_iter().map(TypeView::from).collect(),
        });
    }

    println!("{} ({})", app.name, app.identifier);
    println!("  path: {}", app.path.display());
    println!(
        "  default for {} of {} types",
        snapshot.default_count(identifier),
        types.len()
    );
    for ty in types {
        let marker = if ty.is_default(identifier) { "*" } else { " " };
        println!("  {marker} {:<40} {}", ty.key, ty.name);
    }
    Ok(())
}

async fn set_default(identifier: &str, key: &TypeKey, handle: &RegistryHandle) -> Result<(), AnyError> {
    handle.refresh().await?;
    let app = handle.set_default(identifier, key).await?;
    println!("{} now opens {}", app_label(Some(&app)), key);
    Ok(())
}

async fn set_default_all(identifier: &str, handle: &RegistryHandle) -> Result<(), AnyError> {
    handle.refresh().await?;
    let outcomes = handle.set_default_for_all(identifier).await?;

    let mut failed = 0;
    for (key, outcome) in &outcomes {
        match outcome {
            Ok(_) => println!("  ok     {key}"),
            Err(e) => {
                failed += 1;
                println!("  failed {key}: {e}");
            }
        }
    }
    println!("{} of {} types changed", outcomes.len() - failed, outcomes.len());
    if failed > 0 {
        return Err(format!("{failed} assignments failed").into());
    }
    Ok(())
}

async fn refresh(key: &TypeKey, handle: &RegistryHandle) -> Result<(), AnyError> {
    handle.refresh().await?;
    let app = handle.refresh_default(key).await?;
    println!("{}: {}", key, app_label(app.as_ref()));
    Ok(())
}

async fn resolve(path: PathBuf, json: bool, handle: &RegistryHandle) -> Result<(), AnyError> {
    handle.refresh().await?;
    let ty = handle
        .resolve_ad_hoc(&path)
        .await
        .ok_or_else(|| format!("could not determine the type of {}", path.display()))?;
    print_type(&ty, json)
}
