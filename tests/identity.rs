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

//! Integration tests for ID minting through a context's ID factory

mod common;

use common::*;
use feature_registry::model::{Envelope, Resource, Value};
use feature_registry::{
    ContextId, ContextRegistry, IdentityMode, RegistryConfig, StructureHints, StructureNode,
};
use pretty_assertions::assert_eq;

#[test]
fn test_create_id_is_idempotent() {
    let registry = registry();
    let model = model();
    let structure = context(&registry, "c1", model.clone());
    let ids = structure.context().id_factory();

    let resource = Resource::new("mem://ids");
    let road = road(&model, "", "Main St", Envelope::point(0.0, 0.0));
    resource.add_root(road.clone());

    let first = ids.create_id(&road).unwrap();
    let second = ids.create_id(&road).unwrap();
    assert_eq!(first, "Road.1");
    assert_eq!(first, second);
    assert_eq!(road.get("id"), Some(Value::from("Road.1")));
    assert_eq!(ids.get_id(&road).unwrap().as_deref(), Some("Road.1"));
    assert!(ids.contains(&road));
}

#[test]
fn test_use_id_disambiguates_within_a_resource() {
    let registry = registry();
    let model = model();
    let structure = context(&registry, "c1", model.clone());
    let ids = structure.context().id_factory();

    let resource = Resource::new("mem://ids");
    let first = road(&model, "", "Main St", Envelope::point(0.0, 0.0));
    let second = road(&model, "", "Mill Lane", Envelope::point(1.0, 1.0));
    resource.add_root(first.clone());
    resource.add_root(second.clone());

    assert_eq!(ids.use_id(&first, "X").unwrap(), "X");
    let other = ids.use_id(&second, "X").unwrap();
    assert_ne!(other, "X");
    assert_eq!(second.get("id"), Some(Value::from(other.as_str())));

    // Another resource has its own namespace
    let elsewhere = Resource::new("mem://other");
    let third = road(&model, "", "Side St", Envelope::point(2.0, 2.0));
    elsewhere.add_root(third.clone());
    assert_eq!(ids.use_id(&third, "X").unwrap(), "X");

    // Released IDs become available again
    assert_eq!(ids.release(&first).as_deref(), Some("X"));
    let reused = road(&model, "", "New St", Envelope::point(3.0, 3.0));
    resource.add_root(reused.clone());
    assert_eq!(ids.use_id(&reused, "X").unwrap(), "X");
}

#[test]
fn test_unattached_object_is_a_state_error() {
    let registry = registry();
    let model = model();
    let structure = context(&registry, "c1", model.clone());
    let ids = structure.context().id_factory();

    let road = road(&model, "", "Main St", Envelope::point(0.0, 0.0));
    assert!(ids.create_id(&road).unwrap_err().is_state());
    assert!(ids.get_id(&road).unwrap_err().is_state());
}

#[test]
fn test_nested_objects_share_the_resource_scope() {
    let registry = registry();
    let model = model();
    let structure = context(&registry, "c1", model.clone());
    let ids = structure.context().id_factory();

    let resource = resource(&model);
    let river = resource
        .roots()
        .into_iter()
        .find(|o| o.is_instance_of("River"))
        .unwrap();
    let segments = river.children();
    assert_eq!(ids.create_id(&segments[0]).unwrap(), "Segment.1");
    assert_eq!(ids.create_id(&segments[1]).unwrap(), "Segment.2");
    assert!(ids.contains_resource("mem://fixture"));
}

#[test]
fn test_hinted_id_attribute_is_registered() {
    let model = model();
    let config = RegistryConfig {
        hints: StructureHints::default().with_id_attribute("name"),
        ..RegistryConfig::testing()
    };
    let registry = ContextRegistry::new(config);
    registry.create_context("c1", model.clone()).unwrap();
    let structure = registry.structure(&ContextId::from("c1")).unwrap();
    let road = structure.feature(ROADS_NS, "roads", "Road").unwrap().unwrap();

    assert_eq!(road.id_attribute_name(), "name");
    assert_eq!(
        structure.context().id_factory().id_attribute("Road").as_deref(),
        Some("name")
    );
    // Classes without a `name` attribute keep their intrinsic ID
    let parcel = structure
        .feature(CADASTRE_NS, "cadastre", "Parcel")
        .unwrap()
        .unwrap();
    assert_eq!(parcel.id_attribute_name(), "parcel_id");
}

#[test]
fn test_void_identity_skips_registration() {
    let model = model();
    let config = RegistryConfig {
        identity: IdentityMode::Void,
        ..RegistryConfig::testing()
    };
    let registry = ContextRegistry::new(config);
    registry.create_context("c1", model.clone()).unwrap();
    let structure = registry.structure(&ContextId::from("c1")).unwrap();
    assert!(structure.is_available());

    let ids = structure.context().id_factory();
    assert!(!ids.creates("Road"));

    let resource = Resource::new("mem://void");
    let road = road(&model, "", "Main St", Envelope::point(0.0, 0.0));
    resource.add_root(road.clone());
    assert!(ids.create_id(&road).unwrap_err().is_configuration());
}

#[test]
fn test_disposed_context_forgets_ids() {
    let registry = registry();
    let model = model();
    let structure = context(&registry, "c1", model.clone());
    let context = structure.context().clone();

    let resource = Resource::new("mem://ids");
    let road = road(&model, "", "Main St", Envelope::point(0.0, 0.0));
    resource.add_root(road.clone());
    context.id_factory().create_id(&road).unwrap();

    registry.dispose_context(&ContextId::from("c1"));
    assert!(!context.id_factory().contains(&road));
    assert!(!context.id_factory().creates("Road"));
}
