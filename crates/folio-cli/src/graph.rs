//! JSON graph descriptions and their import through a transaction.
//!
//! A description lists projects; each project is a folder under the root
//! whose direct folders are its top-level folders. Import runs in two
//! commits: the skeleton (projects and their top-level folders) first, then
//! everything below. Elements listed directly in a project, other than
//! folders, are added to the project in the second commit, which the
//! top-level folder rule rejects.

use std::path::Path;

use serde::{Deserialize, Serialize};

use folio_store::WorkingView;
use folio_txn::{CommitMetadata, Transaction, TxnResult};
use folio_types::classes::*;
use folio_types::features::*;
use folio_types::Oid;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(default)]
    pub projects: Vec<ContainerSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    #[serde(flatten)]
    pub attrs: Attributes,
    #[serde(default)]
    pub contents: Vec<ElementSpec>,
}

/// Connections name their endpoints by the id of a sibling node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSpec {
    #[serde(flatten)]
    pub attrs: Attributes,
    pub source: String,
    pub target: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementSpec {
    Folder(ContainerSpec),
    Model(ContainerSpec),
    Node(Attributes),
    Connection(ConnectionSpec),
}

impl GraphSpec {
    pub fn from_json(source: &str) -> serde_json::Result<Self> {
        serde_json::from_str(source)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&source)?)
    }
}

/// Counts of what one commit imported.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub objects: usize,
    pub connections: usize,
    #[serde(skip)]
    author: Option<String>,
}

impl CommitMetadata for ImportSummary {
    fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    fn comment(&self) -> Option<&str> {
        Some("graph import")
    }
}

/// Objects created by the skeleton commit. `folders[i]` is set when the
/// project's `i`-th element is a top-level folder.
#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    projects: Vec<(Oid, Vec<Option<Oid>>)>,
    summary: ImportSummary,
}

impl CommitMetadata for Skeleton {
    fn author(&self) -> Option<&str> {
        self.summary.author()
    }

    fn comment(&self) -> Option<&str> {
        Some("project skeleton")
    }
}

/// Totals over both import commits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub projects: usize,
    pub objects: usize,
    pub connections: usize,
}

/// Import `spec` through `txn`, validating each commit.
pub fn import(txn: &mut Transaction, spec: &GraphSpec, author: Option<&str>) -> TxnResult<ImportReport> {
    let skeleton = txn.do_and_commit_attributed(|view| import_skeleton(view, spec, author))?;
    let rest = txn.do_and_commit_attributed(|view| import_contents(view, spec, &skeleton, author))?;
    Ok(ImportReport {
        projects: skeleton.projects.len(),
        objects: skeleton.summary.objects + rest.objects,
        connections: rest.connections,
    })
}

pub fn import_skeleton(view: &mut WorkingView, spec: &GraphSpec, author: Option<&str>) -> TxnResult<Skeleton> {
    let mut skeleton = Skeleton {
        summary: ImportSummary {
            author: author.map(str::to_owned),
            ..ImportSummary::default()
        },
        ..Skeleton::default()
    };
    for project in &spec.projects {
        let oid = create(view, FOLDER, &project.attrs, Oid::ROOT, &mut skeleton.summary)?;
        let mut folders = Vec::with_capacity(project.contents.len());
        for element in &project.contents {
            let folder = match element {
                ElementSpec::Folder(top) => Some(create(view, FOLDER, &top.attrs, oid, &mut skeleton.summary)?),
                _ => None,
            };
            folders.push(folder);
        }
        skeleton.projects.push((oid, folders));
    }
    Ok(skeleton)
}

pub fn import_contents(
    view: &mut WorkingView,
    spec: &GraphSpec,
    skeleton: &Skeleton,
    author: Option<&str>,
) -> TxnResult<ImportSummary> {
    let mut summary = ImportSummary {
        author: author.map(str::to_owned),
        ..ImportSummary::default()
    };
    for (project, (oid, folders)) in spec.projects.iter().zip(&skeleton.projects) {
        let mut direct = Vec::new();
        for (element, folder) in project.contents.iter().zip(folders) {
            match (element, folder) {
                (ElementSpec::Folder(top), Some(folder)) => {
                    import_elements(view, *folder, &top.contents, &mut summary)?
                }
                _ => direct.push(element.clone()),
            }
        }
        import_elements(view, *oid, &direct, &mut summary)?;
    }
    Ok(summary)
}

fn import_elements(
    view: &mut WorkingView,
    parent: Oid,
    elements: &[ElementSpec],
    summary: &mut ImportSummary,
) -> TxnResult<()> {
    let mut connections = Vec::new();
    for element in elements {
        match element {
            ElementSpec::Folder(spec) => {
                let oid = create(view, FOLDER, &spec.attrs, parent, summary)?;
                import_elements(view, oid, &spec.contents, summary)?;
            }
            ElementSpec::Model(spec) => {
                let oid = create(view, MODEL, &spec.attrs, parent, summary)?;
                import_elements(view, oid, &spec.contents, summary)?;
            }
            ElementSpec::Node(attrs) => {
                create(view, NODE, attrs, parent, summary)?;
            }
            ElementSpec::Connection(spec) => {
                let oid = create(view, CONNECTION, &spec.attrs, parent, summary)?;
                connections.push((oid, spec));
            }
        }
    }

    // Endpoints are wired once every sibling exists. Unknown ids stay unset
    // and are reported by the connection rule.
    for (link, spec) in connections {
        if let Some(source) = sibling(view, parent, &spec.source) {
            view.set(link, SOURCE, source)?;
            if view.object(source).is_some_and(|o| o.is_a(NODE)) {
                view.add(source, OUTGOING, link)?;
            }
        }
        if let Some(target) = sibling(view, parent, &spec.target) {
            view.set(link, TARGET, target)?;
            if view.object(target).is_some_and(|o| o.is_a(NODE)) {
                view.add(target, INCOMING, link)?;
            }
        }
        summary.connections += 1;
    }
    Ok(())
}

fn create(
    view: &mut WorkingView,
    class: &str,
    attrs: &Attributes,
    parent: Oid,
    summary: &mut ImportSummary,
) -> TxnResult<Oid> {
    let oid = view.create(class)?;
    for (feature, value) in [(ID, &attrs.id), (NAME, &attrs.name), (DESCRIPTION, &attrs.description)] {
        if let Some(value) = value {
            view.set(oid, feature, value.as_str())?;
        }
    }
    view.add(parent, CONTENTS, oid)?;
    summary.objects += 1;
    Ok(oid)
}

fn sibling(view: &WorkingView, parent: Oid, id: &str) -> Option<Oid> {
    view.children(parent)
        .into_iter()
        .find(|child| view.text(*child, ID) == Some(id))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use folio_gate::ValidatorKind;
    use folio_txn::{FolioConfig, Persistency, TxnError};

    use super::*;

    const SAMPLE: &str = r#"{
        "projects": [{
            "id": "p1", "name": "Project",
            "contents": [{
                "kind": "folder", "id": "top", "name": "Top",
                "contents": [{
                    "kind": "model", "id": "m", "name": "Model",
                    "contents": [
                        { "kind": "node", "id": "a", "name": "A" },
                        { "kind": "node", "id": "b", "name": "B", "description": "second" },
                        { "kind": "connection", "id": "ab", "name": "A to B", "source": "a", "target": "b" }
                    ]
                }]
            }]
        }]
    }"#;

    fn persistency() -> Persistency {
        Persistency::in_memory(FolioConfig::default())
    }

    #[test]
    fn parses_nested_description() {
        let spec = GraphSpec::from_json(SAMPLE).unwrap();
        assert_eq!(spec.projects.len(), 1);
        let ElementSpec::Folder(top) = &spec.projects[0].contents[0] else {
            panic!("expected a folder");
        };
        assert_eq!(top.attrs.id.as_deref(), Some("top"));
        assert!(matches!(&top.contents[0], ElementSpec::Model(m) if m.contents.len() == 3));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        assert_eq!(GraphSpec::load(file.path()).unwrap(), GraphSpec::from_json(SAMPLE).unwrap());
        assert!(GraphSpec::load(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn imports_in_two_commits() {
        let persistency = persistency();
        let spec = GraphSpec::from_json(SAMPLE).unwrap();
        let mut txn = persistency.open_transaction().unwrap();
        let report = import(&mut txn, &spec, Some("alice")).unwrap();
        assert_eq!(
            report,
            ImportReport {
                projects: 1,
                objects: 6,
                connections: 1,
            }
        );

        let view = txn.view();
        let link = view.find(CONNECTION)[0];
        let source = view
            .get(link, SOURCE)
            .and_then(|v| v.as_single())
            .and_then(|v| v.as_ref_oid())
            .unwrap();
        assert_eq!(view.text(source, ID), Some("a"));
        assert_eq!(view.list(source, OUTGOING).len(), 1);
        txn.close().unwrap();

        let log = persistency.store().commit_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].comment.as_deref(), Some("project skeleton"));
        assert_eq!(log[1].author.as_deref(), Some("alice"));
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let spec = GraphSpec::from_json(&SAMPLE.replace(r#""target": "b""#, r#""target": "zz""#)).unwrap();
        let persistency = persistency();
        let mut txn = persistency.open_transaction().unwrap();
        let err = import(&mut txn, &spec, None).unwrap_err();
        assert!(matches!(&err, TxnError::Validation(v) if v.rule == "connection"));
        txn.close().unwrap();
    }

    #[test]
    fn elements_directly_in_a_project_break_the_top_level_rule() {
        let spec = GraphSpec::from_json(
            r#"{ "projects": [{ "id": "p", "name": "P", "contents": [
                { "kind": "folder", "id": "top", "name": "Top" },
                { "kind": "model", "id": "stray", "name": "Stray" }
            ]}]}"#,
        )
        .unwrap();

        let lenient = persistency();
        let mut txn = lenient.open_transaction().unwrap();
        assert_eq!(import(&mut txn, &spec, None).unwrap().objects, 3);
        txn.close().unwrap();

        let strict = persistency();
        let mut kinds = ValidatorKind::DEFAULT_CHAIN.to_vec();
        kinds.push(ValidatorKind::TopLevelFolder);
        let mut txn = strict.open_transaction_for(&kinds).unwrap();
        let err = import(&mut txn, &spec, None).unwrap_err();
        assert!(matches!(&err, TxnError::Validation(v) if v.rule == "top_level_folder"));
        txn.close().unwrap();
    }
}
