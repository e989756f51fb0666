// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for handing feature structures between contexts

mod common;

use common::*;
use feature_registry::model::ModelProvider;
use feature_registry::structure::{AdaptMode, CacheAction, FeatureSource};
use feature_registry::{ContextId, FeatureStructure, StructureNode};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn test_copy_into_other_context() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let road1 = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    let road2 = c2.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    assert!(road1.eq_structure(&road2));

    let copy = c1.adapt(&road1, AdaptMode::Copy, &c2).unwrap();
    assert!(!Arc::ptr_eq(&copy, &road1));
    assert!(!Arc::ptr_eq(&copy, &road2));
    assert_eq!(copy.uid(), road1.uid());
    assert_eq!(copy.context_id(), ContextId::from("c2"));
    assert!(copy.is_valid());

    // The copy is left for the caller to attach
    assert!(!c2.cache().contains(&copy));
    assert!(c1.cache().contains(&road1));
    assert_eq!(road1.context_id(), ContextId::from("c1"));

    // Attaching keeps the target's canonical instance
    assert!(c2.attach(&copy).is_success());
    assert!(c2.cache().contains(&road2));

    // Copies share nothing with their source
    copy.dispose();
    assert!(copy.is_disposed());
    assert!(!road1.is_disposed());
    assert!(!road2.is_disposed());
    assert_eq!(road1.geometries().unwrap().len(), 1);
    assert!(!road1.geometry("geom").unwrap().unwrap().is_disposed());
}

#[test]
fn test_copy_keeps_metadata() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let river = c1.feature(HYDRO_NS, "hydro", "River").unwrap().unwrap();
    river.set_srid("EPSG:25833").unwrap();
    river.set_default_geometry_name("mouth").unwrap();

    let copy = c1.adapt(&river, AdaptMode::Copy, &c2).unwrap();
    assert_eq!(copy.srid().unwrap(), "EPSG:25833");
    assert!(copy.is_default_geometry("mouth").unwrap());
    assert!(copy.geometry("mouth").unwrap().unwrap().is_default());

    copy.set_srid("EPSG:3857").unwrap();
    assert_eq!(river.srid().unwrap(), "EPSG:25833");
}

#[test]
fn test_move_prefers_existing_equal_structure() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let road1 = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    let road2 = c2.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();

    let moved = c1.adapt(&road1, AdaptMode::Move, &c2).unwrap();
    assert!(Arc::ptr_eq(&moved, &road2));
    assert!(c1.feature(ROADS_NS, "roads", "Road").unwrap().is_none());
    assert_eq!(c2.cache().len(), 4);
}

#[test]
fn test_move_drops_the_source_folder_entry() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let road1 = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    let river = c1.feature(HYDRO_NS, "hydro", "River").unwrap().unwrap();

    c1.adapt(&road1, AdaptMode::Move, &c2).unwrap();

    let remaining = c1.features().unwrap();
    assert_eq!(remaining.len(), 3);
    assert!(remaining.iter().all(|f| f.class_name() != "Road"));
    assert!(remaining.iter().any(|f| Arc::ptr_eq(f, &river)));

    let folder = c1
        .get(MAIN)
        .unwrap()
        .unwrap()
        .get(ROADS_NS)
        .unwrap()
        .unwrap()
        .get("roads")
        .unwrap()
        .unwrap();
    assert!(folder.get("Road").unwrap().is_none());
    assert!(folder.children().unwrap().is_empty());

    // The next validation rescans the live class
    assert!(c1.validate().is_success());
    assert!(folder.get("Road").unwrap().is_some());
}

#[test]
fn test_move_refused_by_target_restores_source() {
    let registry = registry();
    let wide = model();
    wide.insert_class(MAIN, ROADS_NS, wide_road_class()).unwrap();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", wide);
    let road1 = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    let road2 = c2.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();
    assert!(!road1.eq_structure(&road2));

    c2.cache().add_voter(Arc::new(|action: CacheAction, _: &FeatureStructure| {
        action != CacheAction::Attach
    }));
    let err = c1.adapt(&road1, AdaptMode::Move, &c2).unwrap_err();
    assert!(err.is_configuration());

    assert_eq!(road1.context_id(), ContextId::from("c1"));
    assert!(!road1.is_disposed());
    assert!(c1.cache().contains(&road1));
    assert!(Arc::ptr_eq(
        &c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap(),
        &road1
    ));
    assert!(c1.features().unwrap().iter().any(|f| Arc::ptr_eq(f, &road1)));
    assert!(c2.cache().contains(&road2));
}

#[test]
fn test_move_attaches_when_target_has_no_equal_structure() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());

    let river = live_class(&model, MAIN, HYDRO_NS, "River");
    let segment = live_class(&model, MAIN, HYDRO_NS, "Segment");
    let nested = c1
        .create_feature(FeatureSource::nested(
            HYDRO_NS,
            "hydro",
            segment,
            "segments",
            "River",
        ))
        .unwrap();
    let package = model.package(MAIN, HYDRO_NS).unwrap();
    let status = nested.validate(c1.context().id_factory(), &package, Some(river.as_ref()));
    assert!(status.is_success(), "{status}");

    let root = c1.feature(HYDRO_NS, "hydro", "Segment").unwrap().unwrap();
    assert_ne!(nested.uid(), root.uid());

    let moved = c1.adapt(&nested, AdaptMode::Move, &c2).unwrap();
    assert!(Arc::ptr_eq(&moved, &nested));
    assert_eq!(moved.context_id(), ContextId::from("c2"));
    assert!(c2.cache().contains(&moved));
    assert!(!c1.cache().contains(&moved));
    assert_eq!(moved.cache_key().path, "hydro/segments");
}

#[test]
fn test_move_refused_by_voter_leaves_source_intact() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let road = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();

    c1.cache()
        .add_voter(Arc::new(|_: CacheAction, _: &FeatureStructure| false));
    let err = c1.adapt(&road, AdaptMode::Move, &c2).unwrap_err();
    assert!(err.is_configuration());
    assert!(c1.cache().contains(&road));
    assert_eq!(road.context_id(), ContextId::from("c1"));
}

#[test]
fn test_adapt_into_disposed_context_fails() {
    let registry = registry();
    let model = model();
    let c1 = context(&registry, "c1", model.clone());
    let c2 = context(&registry, "c2", model.clone());
    let road = c1.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();

    registry.dispose_context(&ContextId::from("c2"));
    assert!(c1.adapt(&road, AdaptMode::Copy, &c2).unwrap_err().is_state());
}
