use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use jiff::Timestamp;
use quads::{Pattern, Quad, Term};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::ContextManager;
use crate::repo::address::Facet;
use crate::repo::entry::{AccessProperty, Entry};
use crate::repo::error::RepoError;
use crate::repo::rdf::{QuadWriter, RdfFormat, read_quads};
use crate::repo::vocab;

const TRIPLES: &str = "triples.rdf";
const PROPERTIES: &str = "export.properties";
const RESOURCES: &str = "resources/";

const CONTEXT_ENTRY_URI: &str = "contextEntryURI";
const CONTEXT_RESOURCE_URI: &str = "contextResourceURI";
const CONTEXT_METADATA_URI: &str = "contextMetadataURI";
const CONTEXT_RELATION_URI: &str = "contextRelationURI";
const BASE_URI: &str = "baseURI";
const EXPORT_DATE: &str = "exportDate";
const EXPORTING_USER: &str = "exportingUser";
const CONTAINED_USERS: &str = "containedUsers";
const FORMAT: &str = "format";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ImportSummary {
    pub(crate) inserted: usize,
    pub(crate) skipped_principals: usize,
    pub(crate) payloads: usize,
    pub(crate) entries: usize,
}

fn last_segment(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn write_properties(mut out: impl Write, properties: &BTreeMap<&str, String>) -> io::Result<()> {
    writeln!(out, "# exported context")?;
    for (key, value) in properties {
        writeln!(out, "{key}={}", escape(value))?;
    }
    Ok(())
}

/// Reads `key=value` (or `key: value`) lines, skipping comments.
fn read_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim_start)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_owned(), unescape(value[1..].trim())))
        })
        .collect()
}

/// Old principal id mapped to the name it carried in the exporting
/// repository, parsed from `id[:name]` items.
fn contained_users(value: &str) -> HashMap<String, Option<String>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| match item.split_once(':') {
            Some((id, name)) => (id.to_owned(), Some(name.to_owned())),
            None => (item.to_owned(), None),
        })
        .collect()
}

/// Rewrites URIs of the exported context into the destination context.
struct Rewrite {
    canonical: HashMap<String, String>,
    old_namespace: String,
    new_namespace: String,
}

impl Rewrite {
    fn uri(&self, uri: &str) -> String {
        if let Some(mapped) = self.canonical.get(uri) {
            return mapped.clone();
        }
        match uri.strip_prefix(&self.old_namespace) {
            Some(rest) => format!("{}{rest}", self.new_namespace),
            None => uri.to_owned(),
        }
    }

    fn term(&self, term: Term) -> Term {
        match term {
            Term::Iri(uri) => Term::Iri(self.uri(&uri)),
            other => other,
        }
    }
}

/// Payload files extracted from an archive before the import touches the
/// store. Moved into the context folder after the commit; whatever is left is
/// deleted on drop.
struct Staging {
    dir: PathBuf,
    files: Vec<String>,
}

impl Staging {
    fn extract(zip: &mut ZipArchive<BufReader<File>>, data_folder: &Path) -> Result<Staging> {
        let dir = data_folder.join(format!(".import-{}", Uuid::now_v7().simple()));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("unable to create {}", dir.display()))?;
        let mut staging = Staging { dir, files: vec![] };
        for index in 0..zip.len() {
            let mut member = zip.by_index(index)?;
            if member.is_dir() {
                continue;
            }
            let Some(name) = member.name().strip_prefix(RESOURCES).map(str::to_owned) else {
                continue;
            };
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                warn!(target: "transfer", name, "skipping payload with unsafe name");
                continue;
            }
            let path = staging.dir.join(&name);
            let mut out = File::create(&path)
                .with_context(|| format!("unable to create {}", path.display()))?;
            io::copy(&mut member, &mut out)
                .with_context(|| format!("unable to extract {name}"))?;
            staging.files.push(name);
        }
        Ok(staging)
    }

    fn install(&self, folder: &Path) {
        for name in &self.files {
            let target = folder.join(name);
            if let Err(error) = std::fs::rename(self.dir.join(name), &target) {
                warn!(
                    target: "transfer",
                    path = %target.display(),
                    %error,
                    "unable to install payload"
                );
            }
        }
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if let Err(error) = std::fs::remove_dir_all(&self.dir) {
            warn!(
                target: "transfer",
                dir = %self.dir.display(),
                %error,
                "unable to clean up staging"
            );
        }
    }
}

impl ContextManager {
    /// Graphs of a context that go into an export.
    fn export_graphs(&self, context_entry: &Entry, metadata_only: bool) -> Result<Vec<Term>> {
        let codec = &self.backend.codec;
        let namespace = codec.context_namespace(&context_entry.id);
        let own = [
            context_entry.entry_uri.as_str(),
            context_entry.metadata_uri.as_str(),
            context_entry.relation_uri.as_str(),
        ];
        Ok(self
            .backend
            .quads
            .graphs()?
            .into_iter()
            .filter(|graph| {
                let Some(uri) = graph.as_iri() else {
                    return false;
                };
                if metadata_only {
                    uri.starts_with(&namespace)
                        && codec.parse(uri).is_some_and(|address| {
                            matches!(
                                address.facet,
                                Facet::Metadata | Facet::CachedExternalMetadata
                            )
                        })
                } else {
                    uri.starts_with(&namespace) || own.contains(&uri)
                }
            })
            .collect())
    }

    /// Writes a zip archive holding the context's statements, an
    /// `export.properties` descriptor and, unless only metadata is exported,
    /// the payload files. Principals referenced by ACL, creator and
    /// contributor statements are added to `principals`.
    pub(crate) fn export_context(
        &self,
        context_entry: &Entry,
        destination: &Path,
        principals: &mut BTreeSet<String>,
        metadata_only: bool,
        format: RdfFormat,
    ) -> Result<usize> {
        self.backend
            .auth
            .check_authorized(context_entry, AccessProperty::Administer)?;
        let graphs = self.export_graphs(context_entry, metadata_only)?;

        let file = File::create(destination)
            .with_context(|| format!("unable to create {}", destination.display()))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(TRIPLES, options)?;
        let mut statements = 0;
        let mut out = QuadWriter::new(&mut zip, format);
        for graph in &graphs {
            for quad in self.backend.quads.quads(&Pattern::any().graph(graph.clone()))? {
                if !metadata_only {
                    if let (Some(predicate), Some(principal)) =
                        (quad.predicate.as_iri(), quad.object.as_iri())
                    {
                        if vocab::is_principal_predicate(predicate) {
                            principals.insert(principal.to_owned());
                        }
                    }
                }
                out.write(&quad)?;
                statements += 1;
            }
        }
        out.finish()?;

        let mut users = vec![];
        for principal in principals.iter() {
            let id = last_segment(principal);
            match self.principals.name_of(principal)? {
                Some(name) => users.push(format!("{id}:{name}")),
                None => users.push(id.to_owned()),
            }
        }
        let properties = BTreeMap::from([
            (CONTEXT_ENTRY_URI, context_entry.entry_uri.clone()),
            (CONTEXT_RESOURCE_URI, context_entry.resource_uri.clone()),
            (CONTEXT_METADATA_URI, context_entry.metadata_uri.clone()),
            (CONTEXT_RELATION_URI, context_entry.relation_uri.clone()),
            (BASE_URI, self.backend.codec.base().to_owned()),
            (EXPORT_DATE, Timestamp::now().to_string()),
            (EXPORTING_USER, self.backend.auth.current_principal()),
            (CONTAINED_USERS, users.join(",")),
            (FORMAT, format.name().to_owned()),
        ]);
        zip.start_file(PROPERTIES, options)?;
        write_properties(&mut zip, &properties).context("unable to write export properties")?;

        let mut payloads = 0;
        let folder = self.backend.settings.data_folder.join(&context_entry.id);
        if !metadata_only && folder.is_dir() {
            for dirent in std::fs::read_dir(&folder)
                .with_context(|| format!("unable to list {}", folder.display()))?
            {
                let path = dirent?.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !path.is_file() || name.ends_with(".upload") {
                    continue;
                }
                zip.start_file(format!("{RESOURCES}{name}"), options)?;
                let mut payload = File::open(&path)
                    .with_context(|| format!("unable to open {}", path.display()))?;
                io::copy(&mut payload, &mut zip)?;
                payloads += 1;
            }
        }
        zip.finish()?
            .flush()
            .context("unable to flush export archive")?;
        info!(
            target: "transfer",
            context = context_entry.id,
            graphs = graphs.len(),
            statements,
            payloads,
            metadata_only,
            format = format.name(),
            "exported context"
        );
        Ok(statements)
    }

    /// Replaces the content of a context with an archive written by
    /// [`ContextManager::export_context`], possibly from another repository.
    pub(crate) fn import_context(
        &self,
        context_entry: &Entry,
        archive: &Path,
    ) -> Result<ImportSummary> {
        self.backend
            .auth
            .check_authorized(context_entry, AccessProperty::Administer)?;
        let Some(context) = self.get_context(&context_entry.id)? else {
            bail!(RepoError::NotFound(context_entry.entry_uri.clone()));
        };
        let file = File::open(archive)
            .with_context(|| format!("unable to open {}", archive.display()))?;
        let mut zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| RepoError::MalformedInput(format!("not an export archive: {e}")))?;

        let mut text = String::new();
        zip.by_name(PROPERTIES)
            .map_err(|_| RepoError::MalformedInput(format!("{PROPERTIES} is missing")))?
            .read_to_string(&mut text)?;
        let properties = read_properties(&text);
        let missing: Vec<_> = [BASE_URI, CONTEXT_ENTRY_URI, CONTEXT_RESOURCE_URI, CONTAINED_USERS]
            .into_iter()
            .filter(|key| !properties.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            bail!(RepoError::MalformedInput(format!(
                "export properties lack {}",
                missing.join(", ")
            )));
        }
        let format = match properties.get(FORMAT) {
            Some(name) => RdfFormat::from_name(name)
                .ok_or_else(|| RepoError::MalformedInput(format!("unknown format {name}")))?,
            None => RdfFormat::TriG,
        };
        let statements = {
            let triples = zip
                .by_name(TRIPLES)
                .map_err(|_| RepoError::MalformedInput(format!("{TRIPLES} is missing")))?;
            read_quads(BufReader::new(triples), format)?
        };

        let mut canonical = HashMap::new();
        for (key, new) in [
            (CONTEXT_ENTRY_URI, &context_entry.entry_uri),
            (CONTEXT_RESOURCE_URI, &context_entry.resource_uri),
            (CONTEXT_METADATA_URI, &context_entry.metadata_uri),
            (CONTEXT_RELATION_URI, &context_entry.relation_uri),
        ] {
            if let Some(old) = properties.get(key) {
                canonical.insert(old.clone(), new.clone());
            }
        }
        let rewrite = Rewrite {
            canonical,
            old_namespace: format!("{}/", properties[CONTEXT_RESOURCE_URI]),
            new_namespace: format!("{}/", context_entry.resource_uri),
        };
        let users = contained_users(&properties[CONTAINED_USERS]);
        let mut resolved: HashMap<String, Option<String>> = HashMap::new();

        let mut summary = ImportSummary::default();
        let mut rewritten = Vec::with_capacity(statements.len());
        for quad in statements {
            let object = match quad.predicate.as_iri() {
                Some(predicate) if vocab::is_principal_predicate(predicate) => {
                    let Some(old) = quad.object.as_iri() else {
                        continue;
                    };
                    let old_id = last_segment(old).to_owned();
                    if !resolved.contains_key(&old_id) {
                        let principal = self.resolve_principal(&old_id, users.get(&old_id))?;
                        if principal.is_none() {
                            warn!(
                                target: "transfer",
                                principal = old,
                                "unknown principal, skipping its statements"
                            );
                        }
                        resolved.insert(old_id.clone(), principal);
                    }
                    match &resolved[&old_id] {
                        Some(principal) => Term::iri(principal.clone()),
                        None => {
                            summary.skipped_principals += 1;
                            continue;
                        }
                    }
                }
                _ => rewrite.term(quad.object),
            };
            rewritten.push(Quad::new(
                rewrite.term(quad.subject),
                quad.predicate,
                object,
                rewrite.term(quad.graph),
            ));
        }

        let staging = Staging::extract(&mut zip, &self.backend.settings.data_folder)?;
        summary.payloads = staging.files.len();
        let folder = context.payload_folder();
        if !staging.files.is_empty() {
            std::fs::create_dir_all(&folder)
                .with_context(|| format!("unable to create {}", folder.display()))?;
        }

        let mut tx = self.backend.quads.begin()?;
        let removed = context.remove_all_in(&mut tx, Timestamp::now())?;
        for quad in &rewritten {
            if tx.insert(quad)? {
                summary.inserted += 1;
            }
        }
        summary.entries = context.reindex_in(&mut tx, &staging.dir)?;
        tx.commit()?;

        context.after_removals(removed);
        context.after_reindex();
        staging.install(&folder);
        info!(
            target: "transfer",
            context = context_entry.id,
            inserted = summary.inserted,
            skipped = summary.skipped_principals,
            payloads = summary.payloads,
            entries = summary.entries,
            "imported context"
        );
        Ok(summary)
    }

    /// Finds the destination principal for an exported one, by its former
    /// name first and then by id.
    fn resolve_principal(
        &self,
        old_id: &str,
        name: Option<&Option<String>>,
    ) -> Result<Option<String>> {
        if let Some(Some(name)) = name {
            if let Some(principal) = self.principals.principal_by_name(name)? {
                return Ok(Some(principal));
            }
        }
        let principal = self.principals.principal_by_id(old_id)?;
        debug!(target: "transfer", old_id, ?principal, "resolved principal");
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Write;

    use anyhow::Result;
    use quads::{Term, Triple};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    use super::{contained_users, read_properties};
    use crate::repo::entry::{AccessProperty, GraphType, NewEntry};
    use crate::repo::error::RepoError;
    use crate::repo::rdf::RdfFormat;
    use crate::repo::resource::Resource;
    use crate::repo::testing;
    use crate::repo::vocab::{self, iri};

    fn title(subject: &str, text: &str) -> Triple {
        Triple::new(iri(subject), iri(vocab::DC_TITLE), Term::literal(text))
    }

    #[test]
    fn properties_parse_escapes_and_comments() {
        let text = concat!(
            "# comment\n",
            "baseURI=http\\://x/\n",
            "containedUsers=_admin:admin,7\n",
            "\n",
            "format: nquads\n",
        );
        let props = read_properties(text);
        assert_eq!(props["baseURI"], "http://x/");
        assert_eq!(props["format"], "nquads");
        let users = contained_users(&props["containedUsers"]);
        assert_eq!(users["_admin"].as_deref(), Some("admin"));
        assert_eq!(users["7"], None);
    }

    #[test]
    fn export_then_import_into_another_context() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let source = manager.create_context(None)?;
        let target = manager.create_context(None)?;

        let doc = source.create(NewEntry::local(GraphType::None))?;
        source.set_metadata(&doc, &[title(&doc.resource_uri, "Report")])?;
        if let Some(Resource::Data(data)) = source.resource(doc.clone()) {
            data.set_data(&b"hello"[..])?;
        }
        let guest = manager.principals().guest_uri();
        source.grant(&doc, AccessProperty::ReadMetadata, &guest)?;
        let list = source.create(NewEntry::local(GraphType::List))?;
        source.create(NewEntry::local(GraphType::None).in_list(&list.entry_uri))?;

        let archive = dir.path().join("export.zip");
        let source_entry = manager.root().get(source.id())?.expect("context entry");
        let mut principals = BTreeSet::new();
        manager.export_context(&source_entry, &archive, &mut principals, false, RdfFormat::TriG)?;
        assert!(principals.contains(&guest));
        assert!(principals.contains(&manager.principals().admin_uri()));

        let target_entry = manager.root().get(target.id())?.expect("context entry");
        let summary = manager.import_context(&target_entry, &archive)?;
        assert_eq!(summary.skipped_principals, 0);
        assert_eq!(summary.payloads, 1);

        let copied = target.get(&doc.id)?.expect("imported entry");
        assert!(copied.resource_uri.starts_with(target.uri()));
        assert!(copied.acl.allows(AccessProperty::ReadMetadata, &guest));
        assert_eq!(target.local_metadata(&copied)?, vec![title(&copied.resource_uri, "Report")]);
        assert_eq!(target.quota_fill_level()?, 5);
        let Some(Resource::List(children)) = target.resource(target.get(&list.id)?.expect("list"))
        else {
            panic!("list resource expected");
        };
        assert_eq!(children.children()?.len(), 1);
        assert!(children.children()?[0].starts_with(target.uri()));
        let imported = target.entry_uris()?.len();

        // importing twice yields the same content
        manager.import_context(&target_entry, &archive)?;
        assert_eq!(target.entry_uris()?.len(), imported);
        assert_eq!(target.local_metadata(&target.get(&doc.id)?.expect("entry"))?.len(), 1);
        Ok(())
    }

    #[test]
    fn metadata_only_export_in_nquads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let source = manager.create_context(None)?;
        let entry = source.create(NewEntry::local(GraphType::None))?;
        source.set_metadata(&entry, &[title(&entry.resource_uri, "Only metadata")])?;
        let source_entry = manager.root().get(source.id())?.expect("context entry");
        let archive = dir.path().join("md.zip");
        let mut principals = BTreeSet::new();
        let statements =
            manager.export_context(
                &source_entry,
                &archive,
                &mut principals,
                true,
                RdfFormat::NQuads,
            )?;
        assert!(statements >= 1);
        assert!(principals.is_empty());

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive)?)?;
        let mut text = String::new();
        std::io::Read::read_to_string(&mut zip.by_name("triples.rdf")?, &mut text)?;
        assert!(text.contains("Only metadata"));
        assert!(!text.contains(&format!("<{}>", entry.entry_uri)));
        let mut props = String::new();
        std::io::Read::read_to_string(&mut zip.by_name("export.properties")?, &mut props)?;
        assert_eq!(read_properties(&props)["format"], "nquads");
        Ok(())
    }

    #[test]
    fn metadata_only_export_goes_by_graph_facet() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let source = manager.create_context(Some("metadata"))?;
        let entry = source.create(NewEntry::local(GraphType::None))?;
        source.set_metadata(&entry, &[title(&entry.resource_uri, "Facet")])?;
        let source_entry = manager.root().get(source.id())?.expect("context entry");
        let archive = dir.path().join("facet.zip");
        let mut principals = BTreeSet::new();
        manager.export_context(&source_entry, &archive, &mut principals, true, RdfFormat::NQuads)?;

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&archive)?)?;
        let mut text = String::new();
        std::io::Read::read_to_string(&mut zip.by_name("triples.rdf")?, &mut text)?;
        assert!(text.contains("Facet"));
        assert!(!text.contains(&format!("<{}>", entry.entry_uri)));
        Ok(())
    }

    #[test]
    fn unknown_principals_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let target = manager.create_context(None)?;
        let old = "http://elsewhere.org/store/";
        let triples = format!(
            "<{old}1/entry/3> {{\n\
             <{old}1/entry/3> <{res}> <{old}1/resource/3> .\n\
             <{old}1/entry/3> <{creator}> <{old}_principals/resource/42> .\n\
             <{old}1/entry/3> <{contributor}> <{old}_principals/resource/_admin> .\n\
             }}\n",
            res = vocab::RESOURCE,
            creator = vocab::DC_CREATOR,
            contributor = vocab::DC_CONTRIBUTOR,
        );
        let archive = dir.path().join("foreign.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&archive)?);
        zip.start_file("triples.rdf", SimpleFileOptions::default())?;
        zip.write_all(triples.as_bytes())?;
        zip.start_file("export.properties", SimpleFileOptions::default())?;
        write!(
            zip,
            "baseURI={old}\ncontextEntryURI={old}_contexts/entry/1\n\
             contextResourceURI={old}1\ncontainedUsers=42:nobody,_admin\n"
        )?;
        zip.finish()?;

        let target_entry = manager.root().get(target.id())?.expect("context entry");
        let summary = manager.import_context(&target_entry, &archive)?;
        assert_eq!(summary.skipped_principals, 1);
        let entry = target.get("3")?.expect("imported entry");
        assert_eq!(entry.creator, None);
        assert!(entry.contributors.contains(&manager.principals().admin_uri()));
        Ok(())
    }

    #[test]
    fn incomplete_archive_is_malformed_and_changes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let target = manager.create_context(None)?;
        let kept = target.create(NewEntry::local(GraphType::None))?;
        let archive = dir.path().join("broken.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&archive)?);
        zip.start_file("export.properties", SimpleFileOptions::default())?;
        zip.write_all(b"baseURI=http://x/\n")?;
        zip.finish()?;

        let target_entry = manager.root().get(target.id())?.expect("context entry");
        let err = manager.import_context(&target_entry, &archive).unwrap_err();
        assert!(matches!(err.downcast_ref::<RepoError>(), Some(RepoError::MalformedInput(_))));
        assert!(target.get(&kept.id)?.is_some());
        Ok(())
    }

    #[test]
    fn failed_payload_install_keeps_destination() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let source = manager.create_context(None)?;
        let target = manager.create_context(None)?;
        let doc = source.create(NewEntry::local(GraphType::None))?;
        if let Some(Resource::Data(data)) = source.resource(doc) {
            data.set_data(&b"hello"[..])?;
        }
        let archive = dir.path().join("export.zip");
        let source_entry = manager.root().get(source.id())?.expect("context entry");
        let mut principals = BTreeSet::new();
        manager.export_context(&source_entry, &archive, &mut principals, false, RdfFormat::TriG)?;

        let keep = target.create(NewEntry::local(GraphType::None))?;
        target.set_metadata(&keep, &[title(&keep.resource_uri, "Keep")])?;
        let before = target.entry_uris()?;
        // a plain file where the payload folder should go
        let folder = target.payload_folder();
        if folder.exists() {
            std::fs::remove_dir_all(&folder)?;
        }
        std::fs::write(&folder, b"")?;

        let target_entry = manager.root().get(target.id())?.expect("context entry");
        assert!(manager.import_context(&target_entry, &archive).is_err());
        assert_eq!(target.entry_uris()?, before);
        let kept = target.get(&keep.id)?.expect("entry survives");
        assert_eq!(target.local_metadata(&kept)?, vec![title(&kept.resource_uri, "Keep")]);
        assert!(target.deleted_entries()?.is_empty());
        let leftovers = std::fs::read_dir(&manager.backend().settings.data_folder)?
            .flatten()
            .filter(|d| d.file_name().to_string_lossy().starts_with(".import-"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn archive_without_context_entry_uri_changes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = testing::open(dir.path())?;
        let manager = &repo.manager;
        let target = manager.create_context(None)?;
        let keep = target.create(NewEntry::local(GraphType::None))?;
        target.set_metadata(&keep, &[title(&keep.resource_uri, "Keep")])?;
        let before = target.entry_uris()?;

        let old = "http://elsewhere.org/store/";
        let archive = dir.path().join("partial.zip");
        let mut zip = ZipWriter::new(std::fs::File::create(&archive)?);
        zip.start_file("triples.rdf", SimpleFileOptions::default())?;
        write!(
            zip,
            "<{old}1/entry/7> {{ <{old}1/entry/7> <{res}> <{old}1/resource/7> . }}\n",
            res = vocab::RESOURCE,
        )?;
        zip.start_file("export.properties", SimpleFileOptions::default())?;
        write!(zip, "baseURI={old}\ncontextResourceURI={old}1\ncontainedUsers=\n")?;
        zip.finish()?;

        let target_entry = manager.root().get(target.id())?.expect("context entry");
        let err = manager.import_context(&target_entry, &archive).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepoError>(),
            Some(RepoError::MalformedInput(message)) if message.contains("contextEntryURI")
        ));
        assert_eq!(target.entry_uris()?, before);
        assert!(target.get("7")?.is_none());
        let kept = target.get(&keep.id)?.expect("entry survives");
        assert_eq!(target.local_metadata(&kept)?, vec![title(&kept.resource_uri, "Keep")]);
        Ok(())
    }
}
