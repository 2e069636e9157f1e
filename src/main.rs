use anyhow::{anyhow, Context, Result};
use doc_domain::{Decision, Document, DocumentType, SecurityLevel, StepDefinition, VersionType, WorkflowTemplate};
use doc_workflow::{DocflowFactory, DocumentService, EngineConfig, NewVersion, StaticRoleDirectory};
use std::io::{self, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Menú interactivo sobre el motor documental.
///
/// La base de datos sale de `DOCFLOW_DB_URL` (o `DATABASE_URL`); sin ninguna
/// de las dos se usa el fichero SQLite `docflow.db`. Los roles iniciales se
/// leen de `DOCFLOW_ROLES` con el formato `usuario:rol,usuario:rol`.
fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let roles = Arc::new(StaticRoleDirectory::new());
    if let Ok(raw) = std::env::var("DOCFLOW_ROLES") {
        for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
            match pair.split_once(':') {
                Some((user, role)) => roles.grant(user.trim(), role.trim()),
                None => eprintln!("DOCFLOW_ROLES: entrada ignorada '{}'", pair),
            }
        }
    }
    let url = doc_persistence::database_url_from_env().unwrap_or_else(|| "docflow.db".to_string());
    let config = EngineConfig::from_env()?;
    let svc = DocflowFactory::from_url(&url, roles.clone(), config).context("no se pudo abrir la base de datos")?;
    println!("docflow sobre {}", url);

    loop {
        println!("\n== Docflow CLI ==");
        println!("1) Listar documentos");
        println!("2) Crear documento");
        println!("3) Crear versión");
        println!("4) Ver versiones de un documento");
        println!("5) Crear rama");
        println!("6) Merge de rama a main");
        println!("7) Registrar plantilla");
        println!("8) Iniciar workflow sobre una versión");
        println!("9) Decidir paso (aprobar / rechazar / cancelar)");
        println!("10) Ver instancia y ledger");
        println!("11) Estadísticas");
        println!("12) Conceder rol");
        println!("13) Archivar / restaurar / borrar documento");
        println!("0) Salir");
        let choice = prompt("Elige una opción: ")?;
        let res = match choice.trim() {
            "1" => list_documents(&svc),
            "2" => create_document(&svc),
            "3" => create_version(&svc),
            "4" => show_versions(&svc),
            "5" => create_branch(&svc),
            "6" => merge_branch(&svc),
            "7" => register_template(&svc),
            "8" => start_workflow(&svc),
            "9" => decide(&svc),
            "10" => show_instance(&svc),
            "11" => statistics(&svc),
            "12" => {
                let user = prompt("Usuario: ")?;
                let role = prompt("Rol: ")?;
                roles.grant(user.trim(), role.trim());
                println!("Rol '{}' concedido a {}", role.trim(), user.trim());
                Ok(())
            }
            "13" => document_lifecycle(&svc),
            "0" => {
                println!("Saliendo...");
                break;
            }
            other => {
                println!("Opción inválida: {}", other);
                Ok(())
            }
        };
        if let Err(e) = res {
            eprintln!("Error: {:#}", e);
        }
    }
    Ok(())
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}

fn prompt_uuid(msg: &str) -> Result<Uuid> {
    let raw = prompt(msg)?;
    Uuid::parse_str(raw.trim()).map_err(|_| anyhow!("UUID inválido: {}", raw.trim()))
}

fn prompt_optional(msg: &str) -> Result<Option<String>> {
    let raw = prompt(msg)?;
    let raw = raw.trim();
    Ok(if raw.is_empty() { None } else { Some(raw.to_string()) })
}

/// Texto literal, o `@ruta` para leer un fichero.
fn prompt_content(msg: &str) -> Result<Vec<u8>> {
    let raw = prompt(msg)?;
    let raw = raw.trim_end_matches(['\n', '\r']);
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read(path.trim()).with_context(|| format!("no se pudo leer {}", path.trim())),
        None => Ok(raw.as_bytes().to_vec()),
    }
}

fn list_documents(svc: &DocumentService) -> Result<()> {
    let docs = svc.list_documents()?;
    println!("\nID                                   | CÓDIGO          | ESTADO           | TÍTULO");
    println!("-------------------------------------------------------------------------------------");
    for d in docs {
        println!("{} | {:<15} | {:<16} | {}", d.id, d.code, d.status.as_str(), d.title);
    }
    Ok(())
}

fn create_document(svc: &DocumentService) -> Result<()> {
    let code = prompt("Código: ")?;
    let title = prompt("Título: ")?;
    let kind: DocumentType = prompt("Tipo (CONTRACT, POLICY, REPORT, ...): ")?.parse()?;
    let level: SecurityLevel = prompt("Nivel de seguridad (PUBLIC..SECRET): ")?.parse()?;
    let owner = prompt("Propietario: ")?;
    let tags = prompt("Etiquetas separadas por coma (enter para ninguna): ")?;
    let mut doc = Document::new(code.trim(), title.trim(), kind, level, owner.trim())?
        .with_tags(tags.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()));
    if let Some(years) = prompt_optional("Años de retención (enter para ninguno): ")? {
        doc = doc.with_retention_years(years.parse::<u32>().context("años inválidos")?);
    }
    let doc = svc.create_document(doc)?;
    println!("Documento creado: {}", doc.id);
    Ok(())
}

fn document_lifecycle(svc: &DocumentService) -> Result<()> {
    let doc_id = prompt_uuid("Documento (UUID): ")?;
    let doc = match prompt("Acción (archive, restore, delete): ")?.trim().to_ascii_lowercase().as_str() {
        "archive" => svc.archive_document(doc_id)?,
        "restore" => svc.restore_document(doc_id)?,
        "delete" => svc.delete_document(doc_id)?,
        other => return Err(anyhow!("acción desconocida: {}", other)),
    };
    println!("Documento {} -> {}", doc.code, doc.status.as_str());
    Ok(())
}

fn create_version(svc: &DocumentService) -> Result<()> {
    let doc_id = prompt_uuid("Documento (UUID): ")?;
    let kind: VersionType = prompt("Tipo (MAJOR, MINOR, PATCH, DRAFT): ")?.parse()?;
    let branch = prompt_optional("Rama (enter para main): ")?;
    let content = prompt_content("Contenido (texto o @fichero): ")?;
    let author = prompt("Autor: ")?;
    let mut req = NewVersion::new(doc_id, kind, content, author.trim());
    if let Some(b) = branch {
        req = req.on_branch(&b);
    }
    if let Some(summary) = prompt_optional("Resumen del cambio (opcional): ")? {
        req = req.with_summary(&summary);
    }
    let v = svc.create_version(req)?;
    println!("Versión {} creada: {}", v.version_number, v.id);
    Ok(())
}

fn show_versions(svc: &DocumentService) -> Result<()> {
    let doc_id = prompt_uuid("Documento (UUID): ")?;
    println!("\nID                                   | NÚMERO | TIPO  | RAMA         | ESTADO           | ACTUAL");
    println!("------------------------------------------------------------------------------------------------");
    for v in svc.list_versions(doc_id)? {
        println!("{} | {:<6} | {:<5} | {:<12} | {:<16} | {}",
                 v.id,
                 v.version_number.to_string(),
                 v.version_type.as_str(),
                 v.branch_name,
                 v.status.as_str(),
                 if v.is_current_version { "sí" } else { "" });
    }
    Ok(())
}

fn create_branch(svc: &DocumentService) -> Result<()> {
    let doc_id = prompt_uuid("Documento (UUID): ")?;
    let from = prompt_uuid("Versión origen (UUID): ")?;
    let name = prompt("Nombre de la rama: ")?;
    let content = prompt_content("Contenido (texto o @fichero): ")?;
    let author = prompt("Autor: ")?;
    let v = svc.create_branch(doc_id, name.trim(), from, &content, author.trim())?;
    println!("Rama '{}' creada con la versión {} ({})", v.branch_name, v.version_number, v.id);
    Ok(())
}

fn merge_branch(svc: &DocumentService) -> Result<()> {
    let source = prompt_uuid("Versión de la rama (UUID): ")?;
    let doc_id = prompt_uuid("Documento destino (UUID): ")?;
    let kind = match prompt_optional("Tipo (enter para el configurado): ")? {
        Some(raw) => Some(raw.parse::<VersionType>()?),
        None => None,
    };
    let content = prompt_content("Contenido resultante (texto o @fichero): ")?;
    let author = prompt("Autor: ")?;
    let v = svc.merge_branch(source, doc_id, &content, kind, author.trim())?;
    println!("Merge creado: {} ({})", v.version_number, v.id);
    Ok(())
}

fn register_template(svc: &DocumentService) -> Result<()> {
    let name = prompt("Nombre de la plantilla: ")?;
    let types = prompt("Tipos de documento separados por coma: ")?;
    let types = types.split(',')
                     .filter(|t| !t.trim().is_empty())
                     .map(|t| t.parse::<DocumentType>())
                     .collect::<Result<Vec<_>, _>>()?;
    let roles = prompt("Roles aprobadores en orden (coma; sufijo '?' = opcional): ")?;
    let steps: Vec<StepDefinition> = roles.split(',')
                                          .map(|r| r.trim())
                                          .filter(|r| !r.is_empty())
                                          .enumerate()
                                          .map(|(i, r)| {
                                              let (role, required) = match r.strip_suffix('?') {
                                                  Some(role) => (role, false),
                                                  None => (r, true),
                                              };
                                              StepDefinition::new(i as u32 + 1, role, role, required)
                                          })
                                          .collect();
    let t = svc.register_template(WorkflowTemplate::new(name.trim(), types, steps)?)?;
    println!("Plantilla registrada: {}", t.id);
    Ok(())
}

fn start_workflow(svc: &DocumentService) -> Result<()> {
    for t in svc.list_templates()?.iter().filter(|t| t.is_active) {
        let types: Vec<&str> = t.document_types.iter().map(|d| d.as_str()).collect();
        println!("  {} | {} | {}", t.id, t.name, types.join(","));
    }
    let template_id = prompt_uuid("Plantilla (UUID): ")?;
    let doc_id = prompt_uuid("Documento (UUID): ")?;
    let version_id = prompt_uuid("Versión (UUID): ")?;
    let by = prompt("Iniciado por: ")?;
    let inst = svc.instantiate_workflow(template_id, doc_id, version_id, by.trim())?;
    println!("Workflow {} iniciado en el paso {}", inst.id, inst.current_step_index);
    Ok(())
}

fn decide(svc: &DocumentService) -> Result<()> {
    let instance_id = prompt_uuid("Instancia (UUID): ")?;
    let inst = svc.get_instance(instance_id)?;
    println!("Paso actual: {} ({})", inst.current_step_index, inst.status);
    let decision: Decision = prompt("Decisión (APPROVE, REJECT, CANCEL): ")?.parse()?;
    let approver = prompt("Aprobador: ")?;
    let comments = prompt_optional("Comentarios (opcional): ")?;
    let inst = svc.advance_step(instance_id,
                                inst.current_step_index,
                                decision,
                                approver.trim(),
                                comments.as_deref())?;
    println!("Instancia {} -> {} (progreso {:.0}%)", inst.id, inst.status, inst.progress() * 100.0);
    Ok(())
}

fn show_instance(svc: &DocumentService) -> Result<()> {
    let instance_id = prompt_uuid("Instancia (UUID): ")?;
    let inst = svc.get_instance(instance_id)?;
    println!("\nInstancia {} sobre la versión {}: {}", inst.id, inst.version_id, inst.status);
    for (i, s) in inst.steps.iter().enumerate() {
        let marker = if i == inst.current_step_index { ">" } else { " " };
        println!("{} [{}] {} ({}{}) {} {}",
                 marker,
                 i,
                 s.name,
                 s.approver_role,
                 if s.is_required { "" } else { ", opcional" },
                 s.status,
                 s.approver_id.as_deref().unwrap_or("-"));
    }
    println!("\nLedger:");
    for a in svc.ledger(instance_id)? {
        println!("  #{} paso {} {} por {} ({}) {}",
                 a.sequence,
                 a.step_index,
                 a.decision,
                 a.approver_id,
                 a.timestamp.to_rfc3339(),
                 a.entry_hash.get(..12).unwrap_or(&a.entry_hash));
    }
    let chain = svc.verify_chain(instance_id)?;
    println!("Cadena: {}", if chain.valid { "íntegra" } else { "ROTA" });
    Ok(())
}

fn statistics(svc: &DocumentService) -> Result<()> {
    let stats = svc.get_workflow_statistics()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if let Some(doc_id) = prompt_optional("Documento para estadísticas de versiones (enter para omitir): ")? {
        let doc_id = Uuid::parse_str(&doc_id).map_err(|_| anyhow!("UUID inválido"))?;
        println!("{}", serde_json::to_string_pretty(&svc.get_versioning_statistics(doc_id)?)?);
    }
    Ok(())
}
