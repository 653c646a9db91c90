//! Static dataset catalogues
//!
//! - [`CRITICAL_TABLES`]: global datasets the preloader and revalidator keep
//!   warm, keyed by a bare dataset name (e.g. `cursos`)
//! - [`ROUTES`]: route-scoped datasets for the prefetcher, cached under
//!   `route:{path}` so they never collide with critical keys
//! - [`RELATED_ROUTES`]: which routes to warm while the user is on another

use crate::origin::{SortDirection, TableQuery};

/// One dataset managed by the preloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriticalTable {
    pub key: &'static str,
    pub query: TableQuery,
}

/// Dataset backing one navigable route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub route: &'static str,
    pub query: TableQuery,
}

impl RouteDescriptor {
    /// Cache and query key for this route's dataset
    pub fn cache_key(&self) -> String {
        format!("route:{}", self.route)
    }
}

/// Routes worth warming while the user is on `route` or below it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelatedRoutes {
    pub route: &'static str,
    pub related: &'static [&'static str],
}

pub const CRITICAL_TABLES: &[CriticalTable] = &[
    CriticalTable {
        key: "cursos",
        query: TableQuery::new("cursos", "id, titulo, descricao, area, capa, ordem")
            .order_by("ordem", SortDirection::Ascending)
            .limit(100),
    },
    CriticalTable {
        key: "biblioteca_estudos",
        query: TableQuery::new("biblioteca_estudos", "id, area, tema, livro, autor, capa")
            .order_by("area", SortDirection::Ascending)
            .limit(200),
    },
    CriticalTable {
        key: "audioaulas",
        query: TableQuery::new("audioaulas", "id, titulo, area, tema, url_audio, imagem")
            .order_by("sequencia", SortDirection::Ascending)
            .limit(150),
    },
    CriticalTable {
        key: "flashcards_areas",
        query: TableQuery::new("flashcards", "id, area, tema")
            .order_by("area", SortDirection::Ascending)
            .limit(500),
    },
    CriticalTable {
        key: "videoaulas",
        query: TableQuery::new("videoaulas", "id, titulo, area, link, thumbnail")
            .order_by("created_at", SortDirection::Descending)
            .limit(100),
    },
    CriticalTable {
        key: "noticias_juridicas",
        query: TableQuery::new("noticias_juridicas", "id, titulo, fonte, data, capa")
            .order_by("data", SortDirection::Descending)
            .limit(30),
    },
];

pub const ROUTES: &[RouteDescriptor] = &[
    RouteDescriptor {
        route: "/cursos",
        query: TableQuery::new("cursos_modulos", "id, curso_id, titulo, ordem")
            .order_by("ordem", SortDirection::Ascending)
            .limit(300),
    },
    RouteDescriptor {
        route: "/biblioteca",
        query: TableQuery::new("biblioteca_classicos", "id, livro, autor, area, capa")
            .order_by("livro", SortDirection::Ascending)
            .limit(200),
    },
    RouteDescriptor {
        route: "/vade-mecum",
        query: TableQuery::new("vade_mecum_codigos", "id, sigla, nome, tabela")
            .order_by("nome", SortDirection::Ascending),
    },
    RouteDescriptor {
        route: "/jurisprudencia",
        query: TableQuery::new("jurisprudencia_destaques", "id, tribunal, tema, ementa, data")
            .order_by("data", SortDirection::Descending)
            .limit(50),
    },
    RouteDescriptor {
        route: "/simulados",
        query: TableQuery::new("simulados_exames", "id, exame, ano, numero_questoes")
            .order_by("ano", SortDirection::Descending)
            .limit(40),
    },
    RouteDescriptor {
        route: "/resumos",
        query: TableQuery::new("resumos_juridicos", "id, area, tema, subtema")
            .order_by("area", SortDirection::Ascending)
            .limit(300),
    },
    RouteDescriptor {
        route: "/mapas-mentais",
        query: TableQuery::new("mapas_mentais", "id, area, tema, imagem")
            .order_by("area", SortDirection::Ascending)
            .limit(200),
    },
];

pub const RELATED_ROUTES: &[RelatedRoutes] = &[
    RelatedRoutes {
        route: "/",
        related: &["/cursos", "/biblioteca", "/vade-mecum"],
    },
    RelatedRoutes {
        route: "/cursos",
        related: &["/resumos", "/mapas-mentais"],
    },
    RelatedRoutes {
        route: "/biblioteca",
        related: &["/resumos"],
    },
    RelatedRoutes {
        route: "/vade-mecum",
        related: &["/jurisprudencia", "/simulados"],
    },
    RelatedRoutes {
        route: "/simulados",
        related: &["/vade-mecum", "/resumos"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn critical_keys_are_unique() {
        let keys: HashSet<_> = CRITICAL_TABLES.iter().map(|t| t.key).collect();
        assert_eq!(keys.len(), CRITICAL_TABLES.len());
    }

    #[test]
    fn route_keys_do_not_collide_with_critical_keys() {
        let critical: HashSet<_> = CRITICAL_TABLES.iter().map(|t| t.key.to_owned()).collect();
        for route in ROUTES {
            assert!(!critical.contains(&route.cache_key()));
        }
    }

    #[test]
    fn related_routes_are_configured() {
        let known: HashSet<_> = ROUTES.iter().map(|r| r.route).collect();
        for entry in RELATED_ROUTES {
            for related in entry.related {
                assert!(known.contains(related), "{related} has no descriptor");
            }
        }
    }
}
