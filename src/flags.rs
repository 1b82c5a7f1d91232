use std::path::PathBuf;

xflags::xflags! {
    /// Multi-tenant metadata repository of entries grouped into contexts.
    cmd entrystore {
        /// TOML configuration file. Built-in defaults apply without one.
        optional -c,--config path: PathBuf

        /// Ensure the system contexts, lists and principals exist.
        cmd init {}

        /// Create a regular context.
        cmd create-context {
            optional --id id: String
            optional --alias alias: String
        }

        /// Irreversibly delete a context with all its entries and files.
        cmd delete-context {
            required context: String
        }

        /// Bind an alias to a context.
        cmd set-alias {
            required context: String
            required alias: String
        }

        /// Print id, alias and URI of every context.
        cmd list-contexts {}

        /// Write a context into a zip archive.
        cmd export {
            required context: String
            required file: PathBuf
            /// Only metadata graphs, no payload files.
            optional --metadata-only
            /// Serialize as N-Quads instead of TriG.
            optional --nquads
        }

        /// Replace the content of a context with an exported archive.
        cmd import {
            required context: String
            required file: PathBuf
        }

        /// Take a timestamped backup of a context.
        cmd backup {
            required context: String
        }

        cmd list-backups {
            required context: String
        }

        /// Restore a context from the backup taken at TIMESTAMP (yyyyMMddHHmmss).
        cmd restore {
            required context: String
            required timestamp: String
        }

        cmd delete-backup {
            required context: String
            required timestamp: String
        }

        /// Rank entries by literal matches of the given terms.
        cmd search-literals {
            repeated terms: String
            /// Predicate IRI to search, dcterms:title when none is given.
            repeated -p,--predicate predicate: String
            optional --lang lang: String
            /// Context id or alias limiting the search.
            repeated --context context: String
            /// Every term must occur in the same literal.
            optional --match-all
        }

        /// Rebuild the indexes of a context from its entry graphs.
        cmd reindex {
            required context: String
        }
    }
}
