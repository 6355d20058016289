//! In-memory array simulator used by unit tests.
//!
//! Implements the subset of the OceanStor REST surface the provisioner
//! drives, with name uniqueness, association bookkeeping, fault injection
//! and a request log.

use crate::array::envelope::*;
use crate::domain::ports::{ArrayRequest, ArrayTransport, HttpVerb};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Returned for routes the simulator does not know
const UNSUPPORTED_ROUTE: i64 = 50331651;
/// Returned when deleting a LUN that still belongs to a lun group
const LUN_IN_LUNGROUP: i64 = 1077936859;

#[derive(Debug, Clone)]
struct Named {
    name: String,
    description: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeLun {
    pub name: String,
    pub capacity: u64,
    pub wwn: String,
    pub body: Value,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeInitiator {
    pub parent: Option<String>,
    pub use_chap: bool,
    pub chap_name: Option<String>,
    pub multipath_type: Option<String>,
    pub online: bool,
}

#[derive(Debug, Clone)]
struct Fault {
    verb: HttpVerb,
    prefix: String,
    code: i64,
    remaining: Option<usize>,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    version: String,
    hosts: BTreeMap<String, Named>,
    hostgroups: BTreeMap<String, Named>,
    lungroups: BTreeMap<String, Named>,
    views: BTreeMap<String, Named>,
    luns: BTreeMap<String, FakeLun>,
    pools: Vec<PoolRecord>,
    iscsi_initiators: BTreeMap<String, FakeInitiator>,
    fc_initiators: BTreeMap<String, FakeInitiator>,
    /// (hostgroup, host)
    host_in_group: BTreeSet<(String, String)>,
    /// (lungroup, lun)
    lun_in_group: BTreeSet<(String, String)>,
    /// (view, object type, object id)
    view_members: BTreeSet<(String, String, String)>,
    available_host_lun_ids: Vec<u32>,
    faults: Vec<Fault>,
    preempt: Vec<String>,
    unreachable: bool,
    log: Vec<(HttpVerb, String)>,
}

/// Simulated array
pub(crate) struct FakeArray {
    state: Mutex<FakeState>,
}

impl FakeArray {
    pub fn new() -> Self {
        let state = FakeState {
            version: "V300R003C20".to_string(),
            available_host_lun_ids: vec![1, 2, 3],
            pools: vec![PoolRecord {
                id: "0".into(),
                name: "StoragePool001".into(),
                usage_type: Some("1".into()),
                user_free_capacity: "209715200".into(),
                data_space: None,
            }],
            next_id: 100,
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    // =========================================================================
    // Setup
    // =========================================================================

    pub fn set_version(&self, version: &str) {
        self.state.lock().version = version.to_string();
    }

    pub fn add_pool(&self, pool: PoolRecord) {
        self.state.lock().pools.push(pool);
    }

    pub fn add_lun(&self, name: &str, capacity_sectors: u64) -> String {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        let wwn = format!("6{:031x}", id.parse::<u64>().unwrap_or(0));
        state.luns.insert(
            id.clone(),
            FakeLun {
                name: name.to_string(),
                capacity: capacity_sectors,
                wwn,
                body: Value::Null,
            },
        );
        id
    }

    pub fn add_host(&self, name: &str) -> String {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        state.hosts.insert(
            id.clone(),
            Named {
                name: name.to_string(),
                description: None,
            },
        );
        id
    }

    pub fn add_iscsi_initiator(&self, iqn: &str) {
        self.state
            .lock()
            .iscsi_initiators
            .insert(iqn.to_string(), FakeInitiator::default());
    }

    pub fn add_fc_initiator(&self, wwn: &str, online: bool) {
        self.state.lock().fc_initiators.insert(
            wwn.to_string(),
            FakeInitiator {
                online,
                ..Default::default()
            },
        );
    }

    /// Fail every matching request with `code`
    pub fn fail(&self, verb: HttpVerb, prefix: &str, code: i64) {
        self.push_fault(verb, prefix, code, None);
    }

    /// Fail the next matching request with `code`
    pub fn fail_once(&self, verb: HttpVerb, prefix: &str, code: i64) {
        self.push_fault(verb, prefix, code, Some(1));
    }

    fn push_fault(&self, verb: HttpVerb, prefix: &str, code: i64, remaining: Option<usize>) {
        self.state.lock().faults.push(Fault {
            verb,
            prefix: prefix.to_ascii_lowercase(),
            code,
            remaining,
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// The next POST to `collection` finds the name already created by a
    /// concurrent actor.
    pub fn preempt_next_create(&self, collection: &str) {
        self.state.lock().preempt.push(collection.to_ascii_lowercase());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn requests(&self) -> Vec<(HttpVerb, String)> {
        self.state.lock().log.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().log.clear();
    }

    /// Whether any logged request path starts with `prefix` (case-insensitive)
    pub fn requested(&self, verb: HttpVerb, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_lowercase();
        self.state
            .lock()
            .log
            .iter()
            .any(|(v, p)| *v == verb && p.to_ascii_lowercase().starts_with(&prefix))
    }

    pub fn count(&self, collection: &str) -> usize {
        let state = self.state.lock();
        match collection {
            "host" => state.hosts.len(),
            "hostgroup" => state.hostgroups.len(),
            "lungroup" => state.lungroups.len(),
            "mappingview" => state.views.len(),
            "lun" => state.luns.len(),
            _ => 0,
        }
    }

    pub fn find_id(&self, collection: &str, name: &str) -> Option<String> {
        let state = self.state.lock();
        let map = match collection {
            "host" => &state.hosts,
            "hostgroup" => &state.hostgroups,
            "lungroup" => &state.lungroups,
            "mappingview" => &state.views,
            _ => return None,
        };
        map.iter()
            .find(|(_, n)| n.name == name)
            .map(|(id, _)| id.clone())
    }

    pub fn host_description(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .hosts
            .get(id)
            .and_then(|h| h.description.clone())
    }

    pub fn lun_in_group(&self, lungroup: &str, lun: &str) -> bool {
        self.state
            .lock()
            .lun_in_group
            .contains(&(lungroup.to_string(), lun.to_string()))
    }

    pub fn lungroups_of(&self, lun: &str) -> Vec<String> {
        self.state
            .lock()
            .lun_in_group
            .iter()
            .filter(|(_, l)| l == lun)
            .map(|(g, _)| g.clone())
            .collect()
    }

    pub fn host_in_group(&self, hostgroup: &str, host: &str) -> bool {
        self.state
            .lock()
            .host_in_group
            .contains(&(hostgroup.to_string(), host.to_string()))
    }

    pub fn view_has(&self, view: &str, object_type: &str, object_id: &str) -> bool {
        self.state.lock().view_members.contains(&(
            view.to_string(),
            object_type.to_string(),
            object_id.to_string(),
        ))
    }

    pub fn view_member_count(&self, view: &str) -> usize {
        self.state
            .lock()
            .view_members
            .iter()
            .filter(|(v, _, _)| v == view)
            .count()
    }

    pub fn lun(&self, id: &str) -> Option<FakeLun> {
        self.state.lock().luns.get(id).cloned()
    }

    pub fn iscsi_initiator(&self, iqn: &str) -> Option<FakeInitiator> {
        self.state.lock().iscsi_initiators.get(iqn).cloned()
    }

    pub fn fc_initiator(&self, wwn: &str) -> Option<FakeInitiator> {
        self.state.lock().fc_initiators.get(wwn).cloned()
    }

    /// Bind a LUN to a host the way attach would, bypassing the engine
    pub fn expose(&self, lun: &str, host_name: &str) -> String {
        let host = self.add_host(host_name);
        let mut state = self.state.lock();
        let hg = state.insert_named(Collection::HostGroup, &format!("hg-{}", host), None);
        let lg = state.insert_named(Collection::LunGroup, &format!("lg-{}", host), None);
        let view = state.insert_named(Collection::View, &format!("mv-{}", host), None);
        state.host_in_group.insert((hg.clone(), host.clone()));
        state.lun_in_group.insert((lg.clone(), lun.to_string()));
        state.view_members.insert((view.clone(), "14".into(), hg));
        state.view_members.insert((view, "256".into(), lg));
        host
    }
}

#[async_trait]
impl ArrayTransport for FakeArray {
    async fn send(&self, request: ArrayRequest) -> Result<Envelope> {
        // Suspend like a real round trip so concurrent callers interleave.
        tokio::task::yield_now().await;
        Ok(self.state.lock().handle(&request))
    }
}

// =============================================================================
// Request Handling
// =============================================================================

#[derive(Clone, Copy)]
enum Collection {
    Host,
    HostGroup,
    LunGroup,
    View,
}

fn field(body: &Option<Value>, key: &str) -> Option<String> {
    match body.as_ref()?.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let v = urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_default();
            (k.to_string(), v)
        })
        .collect()
}

impl FakeState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn named(&self, collection: Collection) -> &BTreeMap<String, Named> {
        match collection {
            Collection::Host => &self.hosts,
            Collection::HostGroup => &self.hostgroups,
            Collection::LunGroup => &self.lungroups,
            Collection::View => &self.views,
        }
    }

    fn named_mut(&mut self, collection: Collection) -> &mut BTreeMap<String, Named> {
        match collection {
            Collection::Host => &mut self.hosts,
            Collection::HostGroup => &mut self.hostgroups,
            Collection::LunGroup => &mut self.lungroups,
            Collection::View => &mut self.views,
        }
    }

    fn insert_named(&mut self, collection: Collection, name: &str, description: Option<String>) -> String {
        let id = self.allocate_id();
        self.named_mut(collection).insert(
            id.clone(),
            Named {
                name: name.to_string(),
                description,
            },
        );
        id
    }

    fn list_named(&self, collection: Collection) -> Envelope {
        let items: Vec<Value> = self
            .named(collection)
            .iter()
            .map(|(id, n)| {
                let mut item = json!({"ID": id, "NAME": n.name});
                if let Some(d) = &n.description {
                    item["DESCRIPTION"] = json!(d);
                }
                item
            })
            .collect();
        Envelope::ok(Value::Array(items))
    }

    fn create_named(&mut self, collection: Collection, path: &str, body: &Option<Value>) -> Envelope {
        let Some(name) = field(body, "NAME") else {
            return Envelope::failure(UNSUPPORTED_ROUTE, "NAME missing");
        };
        let description = field(body, "DESCRIPTION").filter(|d| !d.is_empty());

        if let Some(pos) = self.preempt.iter().position(|p| p == path) {
            self.preempt.remove(pos);
            if !self.named(collection).values().any(|n| n.name == name) {
                self.insert_named(collection, &name, description.clone());
            }
        }

        if self.named(collection).values().any(|n| n.name == name) {
            return Envelope::failure(OBJECT_NAME_ALREADY_EXIST, "name already exists");
        }

        let id = self.insert_named(collection, &name, description);
        Envelope::ok(json!({"ID": id, "NAME": name}))
    }

    fn lun_exposed(&self, lun: &str) -> bool {
        self.lun_in_group.iter().any(|(lg, l)| {
            l == lun
                && self.view_members.iter().any(|(view, t, id)| {
                    t == "256"
                        && id == lg
                        && self
                            .view_members
                            .iter()
                            .any(|(v, t, _)| v == view && t == "14")
                })
        })
    }

    fn hosts_of_lun(&self, lun: &str) -> Vec<String> {
        let mut hosts = BTreeSet::new();
        for (lg, _) in self.lun_in_group.iter().filter(|(_, l)| l == lun) {
            for (view, _, _) in self
                .view_members
                .iter()
                .filter(|(_, t, id)| t == "256" && id == lg)
            {
                for (_, _, hg) in self
                    .view_members
                    .iter()
                    .filter(|(v, t, _)| v == view && t == "14")
                {
                    for (_, host) in self.host_in_group.iter().filter(|(g, _)| g == hg) {
                        hosts.insert(host.clone());
                    }
                }
            }
        }
        hosts.into_iter().collect()
    }

    fn lun_json(&self, id: &str, lun: &FakeLun) -> Value {
        json!({
            "ID": id,
            "NAME": lun.name,
            "CAPACITY": lun.capacity.to_string(),
            "WWN": lun.wwn,
            "EXPOSEDTOINITIATOR": if self.lun_exposed(id) { "true" } else { "false" },
        })
    }

    fn records(&self, collection: Collection, ids: impl IntoIterator<Item = String>) -> Envelope {
        let items: Vec<Value> = ids
            .into_iter()
            .filter_map(|id| {
                self.named(collection)
                    .get(&id)
                    .map(|n| json!({"ID": id, "NAME": n.name, "DESCRIPTION": n.description}))
            })
            .collect();
        Envelope::ok(Value::Array(items))
    }

    fn check_fault(&mut self, request: &ArrayRequest) -> Option<Envelope> {
        let path = request.path.to_ascii_lowercase();
        let pos = self
            .faults
            .iter()
            .position(|f| f.verb == request.verb && path.starts_with(&f.prefix))?;
        let fault = &mut self.faults[pos];
        let code = fault.code;
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.faults.remove(pos);
            }
        }
        Some(Envelope::failure(code, "injected fault"))
    }

    fn handle(&mut self, request: &ArrayRequest) -> Envelope {
        self.log.push((request.verb, request.path.clone()));

        if self.unreachable {
            return Envelope::unreachable("Connect to server error.");
        }
        if let Some(envelope) = self.check_fault(request) {
            return envelope;
        }

        let (path, query) = request
            .path
            .split_once('?')
            .unwrap_or((request.path.as_str(), ""));
        let query = parse_query(query);
        let q = |k: &str| query.get(k).cloned().unwrap_or_default();
        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(|s| urlencoding::decode(s).map(|c| c.into_owned()).unwrap_or_default())
            .collect();
        let head = segments[0].to_ascii_lowercase();
        let second = segments.get(1).cloned();
        let second_lc = second.as_ref().map(|s| s.to_ascii_lowercase());
        let body = &request.body;
        let collection_path = format!("/{}", head);

        use HttpVerb::*;
        match (request.verb, head.as_str(), second_lc.as_deref()) {
            (Get, "system", _) => Envelope::ok(json!({"PRODUCTVERSION": self.version})),
            (Delete, "sessions", _) => Envelope::empty(),

            // Hosts
            (Get, "host", None) => self.list_named(Collection::Host),
            (Post, "host", None) => self.create_named(Collection::Host, &collection_path, body),
            (Get, "host", Some("associate")) => {
                if q("ASSOCIATEOBJTYPE") == "11" {
                    let hosts = self.hosts_of_lun(&q("ASSOCIATEOBJID"));
                    self.records(Collection::Host, hosts)
                } else {
                    let hg = q("ASSOCIATEOBJID");
                    let hosts: Vec<String> = self
                        .host_in_group
                        .iter()
                        .filter(|(g, _)| *g == hg)
                        .map(|(_, h)| h.clone())
                        .collect();
                    self.records(Collection::Host, hosts)
                }
            }
            (Delete, "host", Some("associate")) => {
                let key = (q("ID"), q("ASSOCIATEOBJID"));
                if self.host_in_group.remove(&key) {
                    Envelope::empty()
                } else {
                    Envelope::failure(OBJECT_NOT_EXIST, "association not exist")
                }
            }

            // Host groups
            (Get, "hostgroup", None) => self.list_named(Collection::HostGroup),
            (Post, "hostgroup", None) => {
                self.create_named(Collection::HostGroup, &collection_path, body)
            }
            (Post, "hostgroup", Some("associate")) => {
                let hg = field(body, "ID").unwrap_or_default();
                let host = field(body, "ASSOCIATEOBJID").unwrap_or_default();
                if !self.hostgroups.contains_key(&hg) || !self.hosts.contains_key(&host) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "object not exist");
                }
                if !self.host_in_group.insert((hg, host)) {
                    return Envelope::failure(HOST_ALREADY_IN_HOSTGROUP, "already in hostgroup");
                }
                Envelope::empty()
            }

            // Lun groups
            (Get, "lungroup", None) => self.list_named(Collection::LunGroup),
            (Post, "lungroup", None) => {
                self.create_named(Collection::LunGroup, &collection_path, body)
            }
            (Post, "lungroup", Some("associate")) => {
                let lg = field(body, "ID").unwrap_or_default();
                let lun = field(body, "ASSOCIATEOBJID").unwrap_or_default();
                if !self.lungroups.contains_key(&lg) || !self.luns.contains_key(&lun) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "object not exist");
                }
                if !self.lun_in_group.insert((lg, lun)) {
                    return Envelope::failure(LUN_ALREADY_IN_LUNGROUP, "already in lungroup");
                }
                Envelope::empty()
            }
            (Delete, "lungroup", Some("associate")) => {
                let key = (q("ID"), q("ASSOCIATEOBJID"));
                if self.lun_in_group.remove(&key) {
                    Envelope::empty()
                } else {
                    Envelope::failure(OBJECT_NOT_EXIST, "association not exist")
                }
            }
            (Get, "lungroup", Some("associate")) => {
                let lun = q("ASSOCIATEOBJID");
                let groups: Vec<String> = self
                    .lun_in_group
                    .iter()
                    .filter(|(_, l)| *l == lun)
                    .map(|(g, _)| g.clone())
                    .collect();
                self.records(Collection::LunGroup, groups)
            }

            // LUNs
            (Get, "lun", Some("associate")) => {
                let lg = q("ASSOCIATEOBJID");
                let items: Vec<Value> = self
                    .lun_in_group
                    .iter()
                    .filter(|(g, _)| *g == lg)
                    .filter_map(|(_, l)| self.luns.get(l).map(|lun| self.lun_json(l, lun)))
                    .collect();
                Envelope::ok(Value::Array(items))
            }
            (Get, "lun", None) => {
                let items: Vec<Value> = self
                    .luns
                    .iter()
                    .map(|(id, lun)| self.lun_json(id, lun))
                    .collect();
                Envelope::ok(Value::Array(items))
            }
            (Post, "lun", None) => {
                let name = field(body, "NAME").unwrap_or_default();
                if self.luns.values().any(|l| l.name == name) {
                    return Envelope::failure(OBJECT_NAME_ALREADY_EXIST, "name already exists");
                }
                let parent = field(body, "PARENTID").unwrap_or_default();
                if !self.pools.iter().any(|p| p.id == parent) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "pool not exist");
                }
                let capacity = field(body, "CAPACITY")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                let id = self.allocate_id();
                let lun = FakeLun {
                    name,
                    capacity,
                    wwn: format!("6{:031x}", id.parse::<u64>().unwrap_or(0)),
                    body: body.clone().unwrap_or(Value::Null),
                };
                let data = self.lun_json(&id, &lun);
                self.luns.insert(id, lun);
                Envelope::ok(data)
            }
            (Get, "lun", Some(_)) => {
                let id = second.unwrap_or_default();
                match self.luns.get(&id) {
                    Some(lun) => Envelope::ok(self.lun_json(&id, lun)),
                    None => Envelope::failure(OBJECT_NOT_EXIST, "lun not exist"),
                }
            }
            (Delete, "lun", Some(_)) => {
                let id = second.unwrap_or_default();
                if !self.luns.contains_key(&id) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "lun not exist");
                }
                if self.lun_in_group.iter().any(|(_, l)| *l == id) {
                    return Envelope::failure(LUN_IN_LUNGROUP, "lun is in a lungroup");
                }
                self.luns.remove(&id);
                Envelope::empty()
            }

            // Mapping views
            (Get, "mappingview", None) => self.list_named(Collection::View),
            (Post, "mappingview", None) => {
                self.create_named(Collection::View, &collection_path, body)
            }
            (Put, "mappingview", Some("create_associate")) => {
                let view = field(body, "ID").unwrap_or_default();
                let obj_type = field(body, "ASSOCIATEOBJTYPE").unwrap_or_default();
                let obj_id = field(body, "ASSOCIATEOBJID").unwrap_or_default();
                if !self.views.contains_key(&view) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "view not exist");
                }
                let code = match obj_type.as_str() {
                    "14" => HOSTGROUP_ALREADY_IN_MAPPINGVIEW,
                    "256" => LUNGROUP_ALREADY_IN_MAPPINGVIEW,
                    _ => PORTGROUP_ALREADY_IN_MAPPINGVIEW,
                };
                if !self.view_members.insert((view, obj_type, obj_id)) {
                    return Envelope::failure(code, "already in mapping view");
                }
                Envelope::empty()
            }
            (Put, "mappingview", Some("remove_associate")) => {
                let key = (
                    field(body, "ID").unwrap_or_default(),
                    field(body, "ASSOCIATEOBJTYPE").unwrap_or_default(),
                    field(body, "ASSOCIATEOBJID").unwrap_or_default(),
                );
                if self.view_members.remove(&key) {
                    Envelope::empty()
                } else {
                    Envelope::failure(OBJECT_NOT_EXIST, "association not exist")
                }
            }
            (Get, "mappingview", Some("associate")) => {
                if segments.get(2).map(|s| s.eq_ignore_ascii_case("lungroup")) == Some(true) {
                    let view = q("ASSOCIATEOBJID");
                    let groups: Vec<String> = self
                        .view_members
                        .iter()
                        .filter(|(v, t, _)| *v == view && t == "256")
                        .map(|(_, _, id)| id.clone())
                        .collect();
                    self.records(Collection::LunGroup, groups)
                } else {
                    let obj_type = q("ASSOCIATEOBJTYPE");
                    let obj_id = q("ASSOCIATEOBJID");
                    let views: Vec<String> = self
                        .view_members
                        .iter()
                        .filter(|(_, t, id)| *t == obj_type && *id == obj_id)
                        .map(|(v, _, _)| v.clone())
                        .collect();
                    self.records(Collection::View, views)
                }
            }
            (Get, "mappingview", Some(_)) => {
                let id = second.unwrap_or_default();
                match self.views.get(&id) {
                    Some(view) => {
                        let ids = serde_json::to_string(&self.available_host_lun_ids)
                            .unwrap_or_default();
                        Envelope::ok(json!({
                            "ID": id,
                            "NAME": view.name,
                            "AVAILABLEHOSTLUNIDLIST": ids,
                        }))
                    }
                    None => Envelope::failure(OBJECT_NOT_EXIST, "view not exist"),
                }
            }

            // Pools
            (Get, "storagepool", None) => {
                Envelope::ok(serde_json::to_value(&self.pools).unwrap_or(Value::Null))
            }

            // iSCSI initiators
            (Get, "iscsi_initiator", None) => {
                let items: Vec<Value> = self
                    .iscsi_initiators
                    .iter()
                    .map(|(id, ini)| {
                        json!({
                            "ID": id,
                            "ISFREE": if ini.parent.is_none() { "true" } else { "false" },
                            "PARENTID": ini.parent,
                        })
                    })
                    .collect();
                Envelope::ok(Value::Array(items))
            }
            (Post, "iscsi_initiator", None) => {
                let id = field(body, "ID").unwrap_or_default();
                self.iscsi_initiators.entry(id).or_default();
                Envelope::empty()
            }
            (Put, "iscsi_initiator", None) => {
                let id = field(body, "ID").unwrap_or_default();
                match self.iscsi_initiators.get_mut(&id) {
                    Some(ini) => {
                        ini.multipath_type = field(body, "MULTIPATHTYPE");
                        Envelope::empty()
                    }
                    None => Envelope::failure(OBJECT_NOT_EXIST, "initiator not exist"),
                }
            }
            (Put, "iscsi_initiator", Some(_)) => {
                let id = second.unwrap_or_default();
                let parent = field(body, "PARENTID");
                if parent.as_ref().map(|p| self.hosts.contains_key(p)) != Some(true) {
                    return Envelope::failure(OBJECT_NOT_EXIST, "host not exist");
                }
                match self.iscsi_initiators.get_mut(&id) {
                    Some(ini) => {
                        ini.parent = parent;
                        ini.use_chap = field(body, "USECHAP").as_deref() == Some("true");
                        ini.chap_name = field(body, "CHAPNAME");
                        Envelope::empty()
                    }
                    None => Envelope::failure(OBJECT_NOT_EXIST, "initiator not exist"),
                }
            }

            // FC initiators
            (Get, "fc_initiator", None) => {
                let free_only = q("ISFREE") == "true";
                let parent = query.get("PARENTID").cloned();
                let items: Vec<Value> = self
                    .fc_initiators
                    .iter()
                    .filter(|(_, ini)| !free_only || ini.parent.is_none())
                    .filter(|(_, ini)| parent.is_none() || ini.parent == parent)
                    .map(|(id, ini)| {
                        json!({
                            "ID": id,
                            "ISFREE": if ini.parent.is_none() { "true" } else { "false" },
                            "PARENTID": ini.parent,
                            "RUNNINGSTATUS": if ini.online { "27" } else { "28" },
                        })
                    })
                    .collect();
                Envelope::ok(Value::Array(items))
            }
            (Put, "fc_initiator", Some(_)) => {
                let id = second.unwrap_or_default();
                let parent = field(body, "PARENTID");
                match self.fc_initiators.get_mut(&id) {
                    Some(ini) => {
                        ini.parent = parent;
                        Envelope::empty()
                    }
                    None => Envelope::failure(OBJECT_NOT_EXIST, "initiator not exist"),
                }
            }

            _ => Envelope::failure(UNSUPPORTED_ROUTE, format!("unsupported route {}", request.path)),
        }
    }
}
