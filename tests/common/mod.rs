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

//! Shared fixture: a small road, hydrology and cadastre model

#![allow(dead_code)]

use feature_registry::model::{
    Envelope, LiveClass, LiveDomain, LiveObject, LivePackage, MemoryModel, ModelProvider,
    Resource, Value, ValueType,
};
use feature_registry::{ContextId, ContextRegistry, ContextStructure, RegistryConfig};
use std::sync::Arc;

pub const MAIN: &str = "main";
pub const CADASTRE: &str = "cadastre";
pub const ROADS_NS: &str = "urn:test:roads";
pub const HYDRO_NS: &str = "urn:test:hydro";
pub const CADASTRE_NS: &str = "urn:test:cadastre";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn road_class() -> LiveClass {
    LiveClass::builder("Road", 0)
        .id("id")
        .attribute("name", ValueType::Text)
        .geometry("geom")
        .build()
}

/// Road with a lane count; same shape as [`road_class`] plus one member
pub fn wide_road_class() -> LiveClass {
    LiveClass::builder("Road", 0)
        .id("id")
        .attribute("name", ValueType::Text)
        .geometry("geom")
        .attribute("lanes", ValueType::Integer)
        .build()
}

pub fn junction_class() -> LiveClass {
    LiveClass::builder("Junction", 1)
        .id("id")
        .attribute("name", ValueType::Text)
        .build()
}

pub fn river_class() -> LiveClass {
    LiveClass::builder("River", 0)
        .id("code")
        .attribute("name", ValueType::Text)
        .geometry("geom")
        .geometry("mouth")
        .contains("segments", "Segment")
        .build()
}

pub fn segment_class() -> LiveClass {
    LiveClass::builder("Segment", 1)
        .id("id")
        .attribute("length", ValueType::Float)
        .geometry("geom")
        .build()
}

pub fn parcel_class() -> LiveClass {
    LiveClass::builder("Parcel", 0)
        .id("parcel_id")
        .attribute("area", ValueType::Float)
        .geometry("bounds")
        .build()
}

pub fn model() -> Arc<MemoryModel> {
    let model = MemoryModel::new();
    model.insert_domain(
        LiveDomain::new(MAIN)
            .with_package(
                LivePackage::new(ROADS_NS, "roads")
                    .with_class(road_class())
                    .with_class(junction_class()),
            )
            .with_package(
                LivePackage::new(HYDRO_NS, "hydro")
                    .with_class(river_class())
                    .with_class(segment_class()),
            ),
    );
    model.insert_domain(
        LiveDomain::new(CADASTRE)
            .with_package(LivePackage::new(CADASTRE_NS, "cadastre").with_class(parcel_class())),
    );
    Arc::new(model)
}

/// Registry with one context over `model`, plus its validated structure
pub fn context(
    registry: &ContextRegistry,
    id: &str,
    model: Arc<MemoryModel>,
) -> Arc<ContextStructure> {
    registry.create_context(id, model).unwrap();
    registry.structure(&ContextId::from(id)).unwrap()
}

pub fn registry() -> ContextRegistry {
    init_logging();
    ContextRegistry::new(RegistryConfig::testing())
}

pub fn live_class(model: &MemoryModel, domain: &str, ns_uri: &str, name: &str) -> Arc<LiveClass> {
    model
        .package(domain, ns_uri)
        .and_then(|p| p.class(name).cloned())
        .unwrap()
}

pub fn road(model: &MemoryModel, id: &str, name: &str, envelope: Envelope) -> Arc<LiveObject> {
    LiveObject::with_values(
        live_class(model, MAIN, ROADS_NS, "Road"),
        [
            ("id", Value::from(id)),
            ("name", Value::from(name)),
            ("geom", Value::from(envelope)),
        ],
    )
    .unwrap()
}

/// Two roads, a river with two segments, and a parcel
pub fn resource(model: &MemoryModel) -> Resource {
    let resource = Resource::new("mem://fixture");
    resource.add_root(road(model, "R1", "Main St", Envelope::new(0.0, 0.0, 2.0, 2.0)));
    resource.add_root(road(model, "R2", "Mill Lane", Envelope::new(5.0, 5.0, 6.0, 6.0)));

    let river = LiveObject::with_values(
        live_class(model, MAIN, HYDRO_NS, "River"),
        [("code", "RH"), ("name", "Rhine")],
    )
    .unwrap();
    for (id, length) in [("S1", 12.5), ("S2", 7.0)] {
        let segment = LiveObject::with_values(
            live_class(model, MAIN, HYDRO_NS, "Segment"),
            [("id", Value::from(id)), ("length", Value::from(length))],
        )
        .unwrap();
        river.add_child("segments", segment).unwrap();
    }
    resource.add_root(river);

    resource.add_root(
        LiveObject::with_values(
            live_class(model, CADASTRE, CADASTRE_NS, "Parcel"),
            [("parcel_id", Value::from("P1")), ("area", Value::from(340.0))],
        )
        .unwrap(),
    );
    resource
}
